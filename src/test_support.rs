//! Shared fixtures for unit and router tests.

use crate::{
    db::run_migrations,
    models::object::Object,
    services::{
        auth_service::TokenVerifier, signing_service::UrlSigner, storage_service::StorageService,
    },
    state::{AppState, SiteSettings},
};
use bytes::Bytes;
use sqlx::sqlite::SqlitePoolOptions;
use std::{io, sync::Arc};
use tempfile::TempDir;

pub const PHOTO_BUCKET: &str = "photos";
pub const PRIVATE_BUCKET: &str = "private-files";
pub const PUBLIC_BASE_URL: &str = "http://localhost:3000/objects/";
pub const URL_SIGNING_SECRET: &str = "test-url-signing-secret";
pub const TOKEN_SECRET: &str = "test-token-secret";

/// Storage over a migrated in-memory database and a fresh temp directory.
/// No buckets exist yet. Keep the `TempDir` alive for the test's duration.
pub async fn memory_storage() -> (StorageService, TempDir) {
    // A single connection that never idles out keeps the in-memory db alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    (StorageService::new(Arc::new(pool), dir.path()), dir)
}

pub async fn put_object(storage: &StorageService, bucket: &str, key: &str, body: &[u8]) -> Object {
    let chunk = Bytes::copy_from_slice(body);
    let stream = futures::stream::once(async move { Ok::<_, io::Error>(chunk) });
    storage
        .upload_object_stream(bucket, key, None, stream)
        .await
        .unwrap()
}

/// Application state with both buckets created.
pub async fn test_state() -> (AppState, TempDir) {
    let (storage, dir) = memory_storage().await;
    storage.ensure_bucket(PHOTO_BUCKET).await.unwrap();
    storage.ensure_bucket(PRIVATE_BUCKET).await.unwrap();

    let state = AppState::new(
        storage,
        UrlSigner::new(URL_SIGNING_SECRET, PUBLIC_BASE_URL).unwrap(),
        TokenVerifier::new(TOKEN_SECRET),
        SiteSettings {
            photo_bucket: PHOTO_BUCKET.into(),
            private_bucket: PRIVATE_BUCKET.into(),
        },
    );
    (state, dir)
}

/// `Authorization` header value for a valid invite.
pub fn bearer(state: &AppState, subject: &str) -> String {
    let token = state
        .tokens
        .issue(subject, chrono::Duration::days(1))
        .unwrap();
    format!("Bearer {}", token)
}
