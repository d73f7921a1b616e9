//! Private file browser handlers. Every route here sits behind the identity
//! gate, so a [`Principal`] is always present in the request extensions.
//!
//! - GET  /files?prefix=  -> folders and files under a prefix
//! - GET  /files/{*key}   -> signed download URL
//! - POST /files          -> signed upload URL for `{ key, contentType }`

use crate::{
    errors::AppError,
    models::object::StorageObject,
    services::{
        auth_service::Principal,
        listing_service::{ListingQuery, list},
    },
    state::{AppState, DELIMITER},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct FilesQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub key: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileListing {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
pub struct FolderEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl From<StorageObject> for FileEntry {
    fn from(object: StorageObject) -> Self {
        Self {
            key: object.key,
            size: object.size,
            last_modified: object.last_modified,
            kind: "file",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
}

/// `GET /files?prefix=`
pub async fn list_files(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<FileListing>, AppError> {
    let prefix = query.prefix.unwrap_or_default();
    let listing = list(
        &state.storage,
        &state.site.private_bucket,
        &ListingQuery::delimited(prefix.clone(), DELIMITER),
    )
    .await?;

    let body = FileListing {
        folders: listing
            .groups
            .into_iter()
            .map(|key| FolderEntry {
                key,
                kind: "folder",
            })
            .collect(),
        files: listing.entries.into_iter().map(FileEntry::from).collect(),
    };
    info!(
        user = %principal.subject,
        prefix = %prefix,
        folders = body.folders.len(),
        files = body.files.len(),
        "listed private files"
    );
    Ok(Json(body))
}

/// `GET /files/{*key}`
pub async fn get_file_url(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(key): Path<String>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    state.storage.ensure_key_safe(&key)?;
    let url = state
        .signer
        .issue_download_url(&state.site.private_bucket, &key)?;

    info!(user = %principal.subject, key = %key, "issued download url");
    Ok(Json(SignedUrlResponse { url: url.into() }))
}

/// `POST /files`
///
/// The body is optional JSON; a missing, empty or unstorable `key` is a 400.
pub async fn create_upload_url(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let request: UploadRequest = if body.is_empty() {
        UploadRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::bad_request(format!("invalid JSON body: {}", err)))?
    };

    let Some(key) = request.key.filter(|k| !k.is_empty()) else {
        return Err(AppError::bad_request("key is required"));
    };
    state.storage.ensure_key_safe(&key)?;

    let url = state.signer.issue_upload_url(
        &state.site.private_bucket,
        &key,
        request.content_type.as_deref(),
    )?;

    info!(user = %principal.subject, key = %key, "issued upload url");
    Ok(Json(SignedUrlResponse { url: url.into() }))
}
