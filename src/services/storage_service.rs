//! src/services/storage_service.rs
//!
//! StorageService: the object store behind both the public albums and the
//! private file browser. Metadata lives in SQLite, payloads live on local disk
//! sharded beneath `base_path/{bucket}/{shard}/{shard}/{digest}`.

use crate::models::{
    bucket::Bucket,
    listing::{ListingPage, PageRequest},
    object::Object,
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("invalid continuation token")]
    InvalidContinuationToken,
    #[error("truncated listing page carried no continuation token")]
    MissingContinuationToken,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the object-store operations the site needs:
/// - Upload an object (streams bytes to disk and upserts metadata)
/// - Get object (reads metadata from SQLite and opens the payload)
/// - List one page of a bucket, ListObjectsV2 style
/// - Create buckets on startup
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const DEFAULT_MAX_KEYS: usize = 1000;
/// Rows pulled from SQLite per scan step while filling a page.
const LIST_SCAN_BATCH: usize = 256;

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/` or contain `..`, `.` or empty
    /// segments, backslashes or control characters. A single trailing `/`
    /// (folder placeholder) is allowed.
    pub fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        let body = key.strip_suffix('/').unwrap_or(key);
        if body.split('/').any(|segment| segment.is_empty() || segment == ".") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Construct the payload path for an object.
    ///
    /// The file name is MD5(bucket/key) in hex, so keys that end in the
    /// delimiter or nest under another key never collide with directories.
    /// The first two digest bytes pick the shard directories.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        let mut path = self.bucket_root(bucket_name);
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    /// Fetch bucket metadata from SQLite.
    ///
    /// Returns BucketNotFound if missing.
    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<Sqlite, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
                other => StorageError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream-upload an object to disk and update metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts metadata row (overwrite semantics).
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let etag = format!("{:x}", digest.compute());

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket_id, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        debug!(bucket, key, size_bytes, "stored object");
        Ok(object)
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    /// Returns ObjectNotFound if metadata exists but physical file is missing.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// List one page of objects following S3 ListObjectsV2 rules.
    ///
    /// Keys come back in byte order. With a delimiter, every key sharing a
    /// group prefix is rolled into that prefix, which counts once against
    /// `max_keys`; the next page resumes after every key under it.
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        request: &PageRequest,
    ) -> StorageResult<ListingPage> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let max_keys = request
            .max_keys
            .unwrap_or(DEFAULT_MAX_KEYS)
            .clamp(1, DEFAULT_MAX_KEYS);
        let prefix = request.prefix.as_str();
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        let mut after = request
            .continuation_token
            .as_deref()
            .map(decode_continuation_token)
            .transpose()?;
        // A token naming a group prefix resumes past every key in that group.
        let mut skip_group = match (after.as_deref(), delimiter) {
            (Some(token), Some(delim))
                if compute_common_prefix(token, prefix, delim).as_deref() == Some(token) =>
            {
                Some(token.to_string())
            }
            _ => None,
        };

        let mut page = ListingPage::default();
        let mut last_emitted: Option<String> = None;

        'scan: loop {
            let rows = self
                .fetch_listing_rows(&bucket_rec, prefix, after.as_deref(), LIST_SCAN_BATCH)
                .await?;
            let exhausted = rows.len() < LIST_SCAN_BATCH;

            for obj in rows {
                after = Some(obj.key.clone());
                if skip_group
                    .as_deref()
                    .is_some_and(|group| obj.key.starts_with(group))
                {
                    continue;
                }
                if page.objects.len() + page.common_prefixes.len() == max_keys {
                    page.is_truncated = true;
                    break 'scan;
                }

                match delimiter.and_then(|d| compute_common_prefix(&obj.key, prefix, d)) {
                    Some(group) => {
                        skip_group = Some(group.clone());
                        last_emitted = Some(group.clone());
                        page.common_prefixes.push(group);
                    }
                    None => {
                        last_emitted = Some(obj.key.clone());
                        page.objects.push(obj.into());
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        if page.is_truncated {
            page.next_continuation_token = last_emitted.as_deref().map(encode_continuation_token);
        }

        debug!(
            bucket,
            prefix,
            objects = page.objects.len(),
            common_prefixes = page.common_prefixes.len(),
            is_truncated = page.is_truncated,
            "listed page"
        );
        Ok(page)
    }

    async fn fetch_listing_rows(
        &self,
        bucket: &Bucket,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<Object>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified \
             FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(bucket.id);

        // substr keeps `%` and `_` in the prefix literal, unlike LIKE.
        if !prefix.is_empty() {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(after) = after {
            builder.push(" AND key > ");
            builder.push_bind(after.to_string());
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(limit as i64);

        Ok(builder.build_query_as().fetch_all(&*self.db).await?)
    }

    /// Create a bucket and initialize its directory.
    ///
    /// Returns BucketAlreadyExists if name conflict occurs.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Return the named bucket, creating it on first use.
    pub async fn ensure_bucket(&self, name: &str) -> StorageResult<Bucket> {
        match self.fetch_bucket(name).await {
            Err(StorageError::BucketNotFound(_)) => match self.create_bucket(name).await {
                Err(StorageError::BucketAlreadyExists(_)) => self.fetch_bucket(name).await,
                created => created,
            },
            found => found,
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Compute the group prefix a key rolls up into.
///
/// Returns Some(prefix) when the delimiter occurs in the key after the
/// requested prefix, otherwise None (the key is a plain entry).
fn compute_common_prefix(key: &str, requested_prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(requested_prefix)?;
    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::with_capacity(requested_prefix.len() + pos + delimiter.len());
    combined.push_str(requested_prefix);
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

fn encode_continuation_token(position: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(position)
}

fn decode_continuation_token(token: &str) -> StorageResult<String> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(StorageError::InvalidContinuationToken)
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
