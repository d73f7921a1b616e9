//! Liveness and readiness probes.
//!
//! - GET /healthz -> `{"status":"ok"}` while the process is up
//! - GET /readyz  -> per-check report over the metadata database, the payload
//!   directory and the two configured buckets; 503 if any check fails

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    checks: BTreeMap<&'static str, Check>,
}

#[derive(Serialize)]
struct Check {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Check {
    fn from_result(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}

pub async fn healthz() -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        checks: BTreeMap::new(),
    })
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let storage = &state.storage;
    let site = &state.site;

    let mut checks = BTreeMap::new();
    checks.insert("sqlite", Check::from_result(ping(&storage.db).await));
    checks.insert("disk", Check::from_result(probe_dir(&storage.base_path).await));
    checks.insert(
        "buckets",
        Check::from_result(
            buckets_present(&storage.db, &[&site.photo_bucket, &site.private_bucket]).await,
        ),
    );

    let ready = checks.values().all(|check| check.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let report = HealthReport {
        status: if ready { "ok" } else { "error" },
        checks,
    };
    (status, Json(report))
}

async fn ping(db: &SqlitePool) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => Ok(()),
        Ok(other) => Err(format!("unexpected result: {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

/// Write, read back and remove a scratch file under `dir`.
async fn probe_dir(dir: &Path) -> Result<(), String> {
    let scratch = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&scratch, b"readyz")
        .await
        .map_err(|e| format!("write failed: {}", e))?;
    let read_back = fs::read(&scratch).await;
    let _ = fs::remove_file(&scratch).await;

    match read_back {
        Ok(bytes) if bytes == b"readyz" => Ok(()),
        Ok(_) => Err("scratch file content mismatch".into()),
        Err(e) => Err(format!("read failed: {}", e)),
    }
}

async fn buckets_present(db: &SqlitePool, names: &[&String]) -> Result<(), String> {
    let mut missing = Vec::new();
    for name in names {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM buckets WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(db)
            .await
            .map_err(|e| e.to_string())?;
        if found.is_none() {
            missing.push(name.as_str());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing buckets: {}", missing.join(", ")))
    }
}
