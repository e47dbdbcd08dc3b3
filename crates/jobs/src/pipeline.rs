// crates/jobs/src/pipeline.rs
//! One station, one range: fetch → scan → build → write → record.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use station_view_core::artifact::validate_station_id;
use station_view_core::rollup::count_in_range;
use station_view_core::{
    build_hourly_rollup, scan_documents, write_artifact, ArtifactError, TimeRange,
};
use station_view_db::{Database, DbError, RollupSuccess};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::StationRollupReport;

#[derive(Debug, Clone)]
pub struct RollupOptions {
    pub artifact_dir: PathBuf,
    /// Rows per store page.
    pub batch_size: u32,
}

#[derive(Debug, Error)]
pub enum RollupJobError {
    #[error("Record store error: {0}")]
    Store(#[from] DbError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Rollup task failed: {0}")]
    Task(String),
}

/// Roll up `station` over `range` and replace its artifact.
///
/// On failure the previous artifact stays in place and the error is recorded
/// against the station (best effort).
pub async fn run_station_rollup(
    db: &Database,
    station: &str,
    range: &TimeRange,
    options: &RollupOptions,
) -> Result<StationRollupReport, RollupJobError> {
    let result = build_and_write(db, station, range, options).await;
    let now = Utc::now().timestamp();

    match &result {
        Ok(report) => {
            let success = RollupSuccess {
                station,
                range,
                records_scanned: report.records_fetched,
                records_skipped: report.records_skipped,
                artifact_path: &report.artifact_path,
                finished_at: now,
            };
            if let Err(e) = db.record_rollup_success(&success).await {
                warn!(station, error = %e, "Failed to record rollup success");
            }
            info!(
                station,
                records = report.records_in_range,
                skipped = report.records_skipped,
                hours = report.hours,
                duration_ms = report.duration_ms,
                "Rollup complete"
            );
        }
        Err(e) => {
            warn!(station, error = %e, "Rollup failed; previous artifact left in place");
            if let Err(record_err) = db.record_rollup_failure(station, &e.to_string(), now).await {
                warn!(station, error = %record_err, "Failed to record rollup failure");
            }
        }
    }
    result
}

async fn build_and_write(
    db: &Database,
    station: &str,
    range: &TimeRange,
    options: &RollupOptions,
) -> Result<StationRollupReport, RollupJobError> {
    let started = Instant::now();
    validate_station_id(station)?;

    let docs = db.fetch_documents(station, range, options.batch_size).await?;
    let records_fetched = docs.len() as u64;

    let station_owned = station.to_owned();
    let range_owned = *range;
    let dir = options.artifact_dir.clone();
    let (artifact_path, skipped, in_range, hours) = tokio::task::spawn_blocking(move || {
        let raw: Vec<_> = docs.into_iter().map(|d| d.into_raw()).collect();
        let scan = scan_documents(&raw);
        let in_range = count_in_range(&scan.records, &range_owned);
        let artifact = build_hourly_rollup(scan.records, &range_owned);
        let hours = artifact.dates.len();
        let path = write_artifact(&dir, &station_owned, &artifact)?;
        Ok::<_, ArtifactError>((path, scan.skipped, in_range, hours))
    })
    .await
    .map_err(|e| RollupJobError::Task(e.to_string()))??;

    Ok(StationRollupReport {
        station: station.to_owned(),
        artifact_path,
        range: *range,
        records_fetched,
        records_skipped: skipped as u64,
        records_in_range: in_range as u64,
        hours,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}
