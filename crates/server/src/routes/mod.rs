//! API route handlers for the station-view server.

pub mod health;
pub mod jobs;
pub mod stations;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET /api/health - Health check
/// - GET /api/stations - Stations with artifacts and last run metadata
/// - GET /api/stations/{station}/rollup - Chart data (hour, day or month)
/// - GET /api/jobs/latest - Most recent rollup run report
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", stations::router())
        .nest("/api", jobs::router())
        .with_state(state)
}
