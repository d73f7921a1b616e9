use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use config::{AppConfig, RunMode};
use services::{
    auth_service::{INVITE_TOKEN_LIFETIME_DAYS, TokenVerifier},
    signing_service::UrlSigner,
    storage_service::StorageService,
};
use state::{AppState, SiteSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-share with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection + schema ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    let tokens = TokenVerifier::new(cfg.token_secret.expose());
    let signer = UrlSigner::new(cfg.url_signing_secret.expose(), &cfg.public_base_url)?;

    // --- One-shot modes ---
    match &mode {
        RunMode::Migrate => {
            tracing::info!("Database migration complete.");
            return Ok(());
        }
        RunMode::IssueToken(subject) => {
            let token = tokens.issue(subject, chrono::Duration::days(INVITE_TOKEN_LIFETIME_DAYS))?;
            tracing::info!(subject = %subject, "issued invite token");
            println!("{}", token);
            return Ok(());
        }
        RunMode::PresignUpload(_) | RunMode::Serve => {}
    }

    // --- Initialize core service ---
    let storage = StorageService::new(db.clone(), cfg.storage_dir.clone());
    storage.ensure_bucket(&cfg.photo_bucket).await?;
    storage.ensure_bucket(&cfg.private_bucket).await?;

    if let RunMode::PresignUpload(key) = &mode {
        storage.ensure_key_safe(key)?;
        let url = signer.issue_upload_url(&cfg.photo_bucket, key, None)?;
        println!("{}", url);
        return Ok(());
    }

    // --- Build router ---
    let state = AppState::new(storage, signer, tokens, SiteSettings::from(&cfg));
    let app: Router = routes::routes::routes(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
