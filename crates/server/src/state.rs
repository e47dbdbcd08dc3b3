// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use station_view_db::Database;
use station_view_jobs::RunReport;
use tokio::sync::watch;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Record store, read for rollup run metadata.
    pub db: Database,
    /// Directory holding `<station>_graph.json` artifacts.
    pub artifact_dir: PathBuf,
    /// Most recent finished rollup run, published by the coordinator.
    /// Stays `None` when the server runs without a rollup loop.
    pub latest_run: watch::Receiver<Option<RunReport>>,
    /// Whether a coordinator feeds `latest_run`.
    pub rollup_attached: bool,
}

impl AppState {
    /// State with no rollup loop attached.
    pub fn new(db: Database, artifact_dir: PathBuf) -> Arc<Self> {
        let (_, latest_run) = watch::channel(None);
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            artifact_dir,
            latest_run,
            rollup_attached: false,
        })
    }

    pub fn with_runs(
        db: Database,
        artifact_dir: PathBuf,
        latest_run: watch::Receiver<Option<RunReport>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            artifact_dir,
            latest_run,
            rollup_attached: true,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
