// crates/jobs/src/lib.rs
//! Station rollup jobs.
//!
//! Provides:
//! - `run_station_rollup` - fetch, build and atomically write one station's artifact
//! - `Coordinator` - bounded-parallel runs over many stations with a single status owner
//! - `run_periodically` - the continuous mode, stopped by a `CancellationToken`

pub mod coordinator;
pub mod pipeline;
pub mod types;

pub use coordinator::{run_periodically, Coordinator};
pub use pipeline::{run_station_rollup, RollupJobError, RollupOptions};
pub use types::{
    RunProgress, RunReport, StationEvent, StationOutcome, StationRollupReport, StationStatus,
};
