//! Shared state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        auth_service::TokenVerifier, signing_service::UrlSigner, storage_service::StorageService,
    },
};
use std::sync::Arc;

/// Fixed root under which every album is a group prefix.
pub const ALBUM_ROOT: &str = "images/";

/// Grouping delimiter for albums and folders.
pub const DELIMITER: &str = "/";

/// Deployment-time settings the handlers read.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub photo_bucket: String,
    pub private_bucket: String,
}

impl From<&AppConfig> for SiteSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            photo_bucket: cfg.photo_bucket.clone(),
            private_bucket: cfg.private_bucket.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub signer: UrlSigner,
    pub tokens: TokenVerifier,
    pub site: Arc<SiteSettings>,
}

impl AppState {
    pub fn new(
        storage: StorageService,
        signer: UrlSigner,
        tokens: TokenVerifier,
        site: SiteSettings,
    ) -> Self {
        Self {
            storage,
            signer,
            tokens,
            site: Arc::new(site),
        }
    }
}
