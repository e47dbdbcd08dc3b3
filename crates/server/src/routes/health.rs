// crates/server/src/routes/health.rs
//! Health check endpoint for the API.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use station_view_core::list_artifacts;

use crate::state::AppState;

/// Response for the health check endpoint.
///
/// `status` is `degraded` when the artifact directory cannot be listed or
/// the last rollup pass had failing stations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub artifact_dir_readable: bool,
    pub stations_on_disk: usize,
    pub rollup_attached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_failed: Option<usize>,
}

/// GET /api/health - Artifact directory and rollup loop status.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let dir = state.artifact_dir.clone();
    let listing = tokio::task::spawn_blocking(move || list_artifacts(&dir)).await;
    let stations_on_disk = match listing {
        Ok(Ok(stations)) => Some(stations.len()),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Artifact directory unreadable");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Artifact listing task failed");
            None
        }
    };

    let latest = state.latest_run.borrow().clone();
    let last_run_failed = latest.as_ref().map(|r| r.failed);
    let healthy = stations_on_disk.is_some() && last_run_failed.unwrap_or(0) == 0;

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        artifact_dir_readable: stations_on_disk.is_some(),
        stations_on_disk: stations_on_disk.unwrap_or(0),
        rollup_attached: state.rollup_attached,
        last_run_finished_at: latest.map(|r| r.finished_at),
        last_run_failed,
    })
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
