//! Rollup run bookkeeping: last success and last error per station.

use std::path::Path;

use crate::{Database, DbResult};
use serde::Serialize;
use sqlx::Row;
use station_view_core::TimeRange;

const RANGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Last known rollup outcome for one station.
///
/// A failure only sets `last_error`; the success fields keep describing the
/// artifact still on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupRun {
    pub station: String,
    pub last_success_at: Option<i64>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    pub records_scanned: i64,
    pub records_skipped: i64,
    pub artifact_path: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: i64,
}

impl RollupRun {
    /// The most recent attempt failed.
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for RollupRun {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            station: row.try_get("station")?,
            last_success_at: row.try_get("last_success_at")?,
            range_start: row.try_get("range_start")?,
            range_end: row.try_get("range_end")?,
            records_scanned: row.try_get("records_scanned")?,
            records_skipped: row.try_get("records_skipped")?,
            artifact_path: row.try_get("artifact_path")?,
            last_error: row.try_get("last_error")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A successful rollup to be recorded.
#[derive(Debug, Clone)]
pub struct RollupSuccess<'a> {
    pub station: &'a str,
    pub range: &'a TimeRange,
    pub records_scanned: u64,
    pub records_skipped: u64,
    pub artifact_path: &'a Path,
    /// Unix seconds.
    pub finished_at: i64,
}

const SELECT_RUN: &str = r#"
    SELECT station, last_success_at, range_start, range_end, records_scanned,
           records_skipped, artifact_path, last_error, updated_at
    FROM rollup_runs
"#;

impl Database {
    pub async fn record_rollup_success(&self, run: &RollupSuccess<'_>) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rollup_runs (
                station, last_success_at, range_start, range_end, records_scanned,
                records_skipped, artifact_path, last_error, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?2)
            ON CONFLICT(station) DO UPDATE SET
                last_success_at = excluded.last_success_at,
                range_start = excluded.range_start,
                range_end = excluded.range_end,
                records_scanned = excluded.records_scanned,
                records_skipped = excluded.records_skipped,
                artifact_path = excluded.artifact_path,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(run.station)
        .bind(run.finished_at)
        .bind(run.range.start.format(RANGE_FORMAT).to_string())
        .bind(run.range.end.format(RANGE_FORMAT).to_string())
        .bind(run.records_scanned as i64)
        .bind(run.records_skipped as i64)
        .bind(run.artifact_path.to_string_lossy().into_owned())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Record a failed attempt, keeping the previous success fields.
    pub async fn record_rollup_failure(&self, station: &str, error: &str, at: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rollup_runs (station, last_error, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(station) DO UPDATE SET
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(station)
        .bind(error)
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_rollup_run(&self, station: &str) -> DbResult<Option<RollupRun>> {
        let sql = format!("{SELECT_RUN} WHERE station = ?");
        let run = sqlx::query_as(&sql)
            .bind(station)
            .fetch_optional(self.pool())
            .await?;
        Ok(run)
    }

    pub async fn list_rollup_runs(&self) -> DbResult<Vec<RollupRun>> {
        let sql = format!("{SELECT_RUN} ORDER BY station");
        let runs = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        Ok(runs)
    }
}
