//! HTTP handlers for object payloads, the targets of album links and signed
//! URLs. Streams object bodies to avoid buffering in memory and delegates
//! storage concerns to `StorageService`.
//!
//! Objects in the public photo bucket are readable without a signature;
//! everything else needs a URL signed for exactly this bucket, key and method.

use crate::{
    errors::AppError,
    models::object::Object,
    services::signing_service::{SignedOperation, SignedQuery},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Upload an object to `/objects/{bucket}/{*key}` with a signed PUT URL.
///
/// The request `Content-Type` must match the one the URL was signed for.
pub async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(grant): Query<SignedQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    state
        .signer
        .verify(
            SignedOperation::Upload,
            &bucket,
            &key,
            content_type.as_deref(),
            &grant,
        )
        .inspect_err(|err| warn!(bucket = %bucket, key = %key, "rejected upload: {}", err))?;

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = state
        .storage
        .upload_object_stream(&bucket, &key, content_type, stream)
        .await?;
    info!(bucket = %bucket, key = %key, size = object.size_bytes, "object uploaded");

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    if let Some(etag) = object.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    Ok(response)
}

/// Download an object `/objects/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(grant): Query<SignedQuery>,
) -> Result<Response, AppError> {
    if bucket != state.site.photo_bucket {
        state
            .signer
            .verify(SignedOperation::Download, &bucket, &key, None, &grant)
            .inspect_err(|err| warn!(bucket = %bucket, key = %key, "rejected download: {}", err))?;
    }

    let (meta, file) = state.storage.get_object_reader(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
