// crates/server/src/routes/jobs.rs
//! API routes for rollup runs.
//!
//! - GET /jobs/latest - report of the most recent finished run

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

/// GET /api/jobs/latest - latest `RunReport`, or 204 before the first run finishes.
async fn latest_run(State(state): State<Arc<AppState>>) -> Response {
    let latest = state.latest_run.borrow().clone();
    match latest {
        Some(report) => Json(report).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs/latest", get(latest_run))
}
