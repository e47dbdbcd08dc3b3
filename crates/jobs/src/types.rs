// crates/jobs/src/types.rs
//! Types shared by the rollup pipeline and the coordinator.

use std::path::PathBuf;

use serde::Serialize;
use station_view_core::TimeRange;
use uuid::Uuid;

/// Status of one station within a coordinated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StationStatus::Completed | StationStatus::Failed)
    }
}

/// What one station rollup produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRollupReport {
    pub station: String,
    pub artifact_path: PathBuf,
    pub range: TimeRange,
    /// Rows read from the store.
    pub records_fetched: u64,
    /// Rows dropped for a missing or unparseable `dtime`.
    pub records_skipped: u64,
    /// Parsed records that fell inside the range.
    pub records_in_range: u64,
    pub hours: usize,
    pub duration_ms: u64,
}

/// Message from a station task to the coordinator loop.
#[derive(Debug)]
pub enum StationEvent {
    Started { station: String },
    Finished { report: StationRollupReport },
    Failed { station: String, error: String },
}

/// Final state of one station in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationOutcome {
    pub station: String,
    pub status: StationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<StationRollupReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StationOutcome {
    pub fn pending(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            status: StationStatus::Pending,
            report: None,
            error: None,
        }
    }
}

/// Live counters for an in-flight run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl RunProgress {
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }
}

/// Summary of one coordinated run over many stations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: String,
    pub finished_at: String,
    pub range: TimeRange,
    pub succeeded: usize,
    pub failed: usize,
    pub stations: Vec<StationOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
