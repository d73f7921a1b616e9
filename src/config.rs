use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Public bucket whose `images/` groups are the albums.
    pub photo_bucket: String,
    /// Invite-only bucket behind the file browser.
    pub private_bucket: String,
    /// Prefix object links are built on, e.g. `https://photos.example.com/objects/`.
    pub public_base_url: String,
    pub url_signing_secret: Secret,
    pub token_secret: Secret,
}

/// A secret string that never shows up in `Debug` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(**redacted**)")
    }
}

/// What the binary should do after loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    IssueToken(String),
    PresignUpload(String),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo albums and invite-only file sharing")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_SHARE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_SHARE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides PHOTO_SHARE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_SHARE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public photo bucket (overrides PHOTO_SHARE_BUCKET)
    #[arg(long)]
    pub photo_bucket: Option<String>,

    /// Private file bucket (overrides PHOTO_SHARE_PRIVATE_BUCKET)
    #[arg(long)]
    pub private_bucket: Option<String>,

    /// Base URL for object links (overrides PHOTO_SHARE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Secret for signing object URLs (overrides PHOTO_SHARE_URL_SIGNING_SECRET)
    #[arg(long)]
    pub url_signing_secret: Option<String>,

    /// Secret for bearer tokens (overrides PHOTO_SHARE_TOKEN_SECRET)
    #[arg(long)]
    pub token_secret: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Print an invite token for SUBJECT and exit
    #[arg(long, value_name = "SUBJECT", conflicts_with_all = ["migrate", "presign_upload"])]
    pub issue_token: Option<String>,

    /// Print a signed upload URL for KEY in the photo bucket and exit
    #[arg(long, value_name = "KEY", conflicts_with = "migrate")]
    pub presign_upload: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed arguments over values looked up by environment name.
    pub fn resolve(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, RunMode)> {
        let env_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        // --- Environment fallback ---
        let env_port = match lookup("PHOTO_SHARE_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PHOTO_SHARE_PORT value `{}`", value))?,
            None => 3000,
        };

        let url_signing_secret = args
            .url_signing_secret
            .or_else(|| lookup("PHOTO_SHARE_URL_SIGNING_SECRET"))
            .filter(|s| !s.is_empty())
            .context("PHOTO_SHARE_URL_SIGNING_SECRET (or --url-signing-secret) is required")?;
        let token_secret = args
            .token_secret
            .or_else(|| lookup("PHOTO_SHARE_TOKEN_SECRET"))
            .filter(|s| !s.is_empty())
            .context("PHOTO_SHARE_TOKEN_SECRET (or --token-secret) is required")?;

        // --- Merge ---
        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("PHOTO_SHARE_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("PHOTO_SHARE_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "PHOTO_SHARE_DATABASE_URL",
                    "sqlite://./data/meta/photo_share.db",
                )
            }),
            photo_bucket: args
                .photo_bucket
                .unwrap_or_else(|| env_or("PHOTO_SHARE_BUCKET", "photos")),
            private_bucket: args
                .private_bucket
                .unwrap_or_else(|| env_or("PHOTO_SHARE_PRIVATE_BUCKET", "private-files")),
            public_base_url: args.public_base_url.unwrap_or_else(|| {
                env_or(
                    "PHOTO_SHARE_PUBLIC_BASE_URL",
                    "http://127.0.0.1:3000/objects/",
                )
            }),
            url_signing_secret: Secret(url_signing_secret),
            token_secret: Secret(token_secret),
        };

        if !cfg.public_base_url.ends_with('/') {
            bail!(
                "public base url `{}` must end with `/`",
                cfg.public_base_url
            );
        }
        if cfg.photo_bucket == cfg.private_bucket {
            bail!("photo and private buckets must differ");
        }

        let mode = match (args.migrate, args.issue_token, args.presign_upload) {
            (true, _, _) => RunMode::Migrate,
            (_, Some(subject), _) => RunMode::IssueToken(subject),
            (_, _, Some(key)) => RunMode::PresignUpload(key),
            _ => RunMode::Serve,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
