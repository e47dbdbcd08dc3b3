// crates/server/src/routes/stations.rs
//! Station listing and per-station chart data.
//!
//! - GET /stations - stations with an artifact or a recorded rollup run
//! - GET /stations/{station}/rollup?granularity=hour|day|month - chart view

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use station_view_core::{list_artifacts, ArtifactError, Granularity, StationCharts};
use station_view_db::RollupRun;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// One row of the station list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSummary {
    pub station: String,
    pub has_artifact: bool,
    /// The last rollup attempt failed; any artifact on disk is from an earlier run.
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RollupRun>,
}

#[derive(Debug, Deserialize)]
pub struct RollupQuery {
    pub granularity: Option<String>,
}

/// GET /api/stations - Stations known from artifacts on disk or run history.
pub async fn list_stations(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<StationSummary>>> {
    let dir = state.artifact_dir.clone();
    let with_artifacts = tokio::task::spawn_blocking(move || list_artifacts(&dir))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    let runs = state.db.list_rollup_runs().await?;

    let mut summaries: BTreeMap<String, StationSummary> = BTreeMap::new();
    for station in with_artifacts {
        summaries.insert(
            station.clone(),
            StationSummary {
                station,
                has_artifact: true,
                stale: false,
                last_run: None,
            },
        );
    }
    for run in runs {
        let summary = summaries
            .entry(run.station.clone())
            .or_insert_with(|| StationSummary {
                station: run.station.clone(),
                has_artifact: false,
                stale: false,
                last_run: None,
            });
        summary.stale = run.is_stale();
        summary.last_run = Some(run);
    }

    Ok(Json(summaries.into_values().collect()))
}

/// GET /api/stations/{station}/rollup - Chart data at the requested granularity.
///
/// Defaults to hourly. Charts that fail to parse are reported individually
/// with `"status": "error"`.
pub async fn station_rollup(
    State(state): State<Arc<AppState>>,
    Path(station): Path<String>,
    Query(query): Query<RollupQuery>,
) -> ApiResult<Json<StationCharts>> {
    let granularity = match query.granularity.as_deref() {
        None | Some("") => Granularity::Hour,
        Some(raw) => raw.parse::<Granularity>().map_err(ApiError::BadRequest)?,
    };

    let dir = state.artifact_dir.clone();
    let name = station.clone();
    let loaded = tokio::task::spawn_blocking(move || StationCharts::load(&dir, &name, granularity))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match loaded {
        Ok(charts) => {
            let failed = charts.failed_charts();
            if failed > 0 {
                tracing::warn!(station = %station, failed, "Serving station view with failed charts");
            }
            Ok(Json(charts))
        }
        Err(ArtifactError::NotFound { .. }) => Err(ApiError::NoData(station)),
        Err(e) => Err(e.into()),
    }
}

/// Build the stations router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stations", get(list_stations))
        .route("/stations/{station}/rollup", get(station_rollup))
}
