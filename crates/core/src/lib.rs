// crates/core/src/lib.rs
pub mod artifact;
pub mod bucket;
pub mod charts;
pub mod config;
pub mod error;
pub mod paths;
pub mod reaggregate;
pub mod rollup;
pub mod types;

pub use artifact::{
    artifact_path, list_artifacts, load_hourly_artifact, read_artifact_value, write_artifact,
    CountTable, Granularity, RollupArtifact,
};
pub use bucket::{
    floor_to_hour, hour_axis, hour_label, parse_range_bound, TimeRange, MAX_RANGE_DAYS,
};
pub use charts::{ChartState, StationCharts};
pub use config::{Config, LogConfig};
pub use error::*;
pub use reaggregate::{reaggregate, CoarseAxis};
pub use rollup::{build_hourly_rollup, scan_documents, DocumentScan};
pub use types::*;
