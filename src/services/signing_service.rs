//! Time-limited signed URLs for single-object GET and PUT.
//!
//! A signed URL names one bucket, one key and one method. The signature is
//! HMAC-SHA256 over
//!
//! ```text
//! METHOD
//! BUCKET
//! KEY
//! EXPIRES
//! CONTENT_TYPE
//! ```
//!
//! where `CONTENT_TYPE` is empty for downloads. The object routes recompute
//! it from the incoming request, so a URL signed for GET never authorizes a
//! PUT and vice versa.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of every issued URL.
pub const SIGNED_URL_TTL_SECS: i64 = 900;

pub const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signed url is missing its expiry or signature")]
    MissingSignature,
    #[error("signed url has expired")]
    Expired,
    #[error("signature does not match request")]
    SignatureMismatch,
    #[error("public base url `{0}` cannot carry object paths")]
    InvalidBaseUrl(String),
    #[error("url signing secret is unusable")]
    InvalidSecret,
    #[error("object key `{0}` cannot be expressed as a url path")]
    UnaddressableKey(String),
}

pub type SignResult<T> = Result<T, SignError>;

/// The single operation a URL grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedOperation {
    Download,
    Upload,
}

impl SignedOperation {
    fn method(self) -> &'static str {
        match self {
            Self::Download => "GET",
            Self::Upload => "PUT",
        }
    }
}

/// Signature parameters presented on an object request.
#[derive(Debug, Default, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// Issues and verifies signed object URLs.
#[derive(Clone)]
pub struct UrlSigner {
    keyed: HmacSha256,
    base_url: Url,
    ttl: Duration,
}

impl UrlSigner {
    /// `base_url` is the public prefix object paths are appended to, e.g.
    /// `https://files.example.com/objects/`.
    pub fn new(secret: impl AsRef<[u8]>, base_url: &str) -> SignResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|_| SignError::InvalidBaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(SignError::InvalidBaseUrl(base_url.to_string()));
        }
        let keyed = <HmacSha256 as Mac>::new_from_slice(secret.as_ref())
            .map_err(|_| SignError::InvalidSecret)?;
        Ok(Self {
            keyed,
            base_url,
            ttl: Duration::seconds(SIGNED_URL_TTL_SECS),
        })
    }

    pub fn issue_download_url(&self, bucket: &str, key: &str) -> SignResult<Url> {
        self.issue_at(SignedOperation::Download, bucket, key, None, Utc::now())
    }

    pub fn issue_upload_url(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> SignResult<Url> {
        let content_type = content_type.unwrap_or(DEFAULT_UPLOAD_CONTENT_TYPE);
        self.issue_at(
            SignedOperation::Upload,
            bucket,
            key,
            Some(content_type),
            Utc::now(),
        )
    }

    /// Unsigned link to an object: `{base_url}{bucket}/{key}` with every key
    /// segment percent-encoded.
    ///
    /// Dot segments are refused since URL normalization would turn the link
    /// into one for a different key.
    pub fn object_url(&self, bucket: &str, key: &str) -> SignResult<Url> {
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(SignError::UnaddressableKey(key.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SignError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn issue_at(
        &self,
        operation: SignedOperation,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> SignResult<Url> {
        let expires = (now + self.ttl).timestamp();
        let signature = hex::encode(
            self.mac(operation, bucket, key, expires, content_type)
                .finalize()
                .into_bytes(),
        );

        let mut url = self.object_url(bucket, key)?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url)
    }

    /// Check a presented signature against the request it arrived on.
    pub fn verify(
        &self,
        operation: SignedOperation,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        query: &SignedQuery,
    ) -> SignResult<()> {
        self.verify_at(operation, bucket, key, content_type, query, Utc::now())
    }

    fn verify_at(
        &self,
        operation: SignedOperation,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        query: &SignedQuery,
        now: DateTime<Utc>,
    ) -> SignResult<()> {
        let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
            return Err(SignError::MissingSignature);
        };
        let presented = hex::decode(signature).map_err(|_| SignError::SignatureMismatch)?;

        let content_type = match operation {
            SignedOperation::Download => None,
            SignedOperation::Upload => Some(content_type.unwrap_or(DEFAULT_UPLOAD_CONTENT_TYPE)),
        };
        self.mac(operation, bucket, key, expires, content_type)
            .verify_slice(&presented)
            .map_err(|_| SignError::SignatureMismatch)?;

        if now.timestamp() > expires {
            return Err(SignError::Expired);
        }
        Ok(())
    }

    fn mac(
        &self,
        operation: SignedOperation,
        bucket: &str,
        key: &str,
        expires: i64,
        content_type: Option<&str>,
    ) -> HmacSha256 {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}",
            operation.method(),
            bucket,
            key,
            expires,
            content_type.unwrap_or("")
        );
        let mut mac = self.keyed.clone();
        mac.update(string_to_sign.as_bytes());
        mac
    }
}
