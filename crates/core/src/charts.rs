// crates/core/src/charts.rs
//! Dashboard view of one station's artifact.
//!
//! Each chart is parsed and re-aggregated on its own so a damaged table only
//! takes down that chart. The `dates` axis is shared, so a bad axis fails the
//! whole view.

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::artifact::{
    artifact_path, parse_counts, parse_dates, read_artifact_value, CountTable, Granularity,
};
use crate::error::{ArtifactError, ShapeError};
use crate::reaggregate::{reaggregate_table, sum_series, CoarseAxis};
use crate::types::Dimension;

/// Chart name of the flat log-count series.
pub const LOG_CHART: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChartState {
    Ready {
        index: Vec<String>,
        series: IndexMap<String, Vec<u64>>,
    },
    Error {
        message: String,
    },
}

impl ChartState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ChartState::Ready { .. })
    }

    fn from_table(table: CountTable) -> Self {
        let index = table.index().map(str::to_owned).collect();
        let series = table.iter().map(|(k, v)| (k.to_owned(), v.to_vec())).collect();
        ChartState::Ready { index, series }
    }

    fn from_log(counts: Vec<u64>) -> Self {
        let mut series = IndexMap::new();
        series.insert(LOG_CHART.to_owned(), counts);
        ChartState::Ready {
            index: vec![LOG_CHART.to_owned()],
            series,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationCharts {
    pub station: String,
    pub granularity: Granularity,
    pub dates: Vec<String>,
    /// Keyed by dimension stem, plus [`LOG_CHART`].
    pub charts: IndexMap<String, ChartState>,
}

impl StationCharts {
    /// Build the view from an hourly artifact's JSON at `granularity`.
    pub fn from_value(station: &str, value: &Value, granularity: Granularity) -> Result<Self, ShapeError> {
        let hourly_dates = parse_dates(value)?;
        let axis = CoarseAxis::derive(&hourly_dates, Granularity::Hour, granularity)?;
        let source_len = hourly_dates.len();

        let mut charts = IndexMap::new();
        for dim in Dimension::ALL {
            if dim == Dimension::Group {
                let chart = log_chart(value, source_len, &axis);
                charts.insert(LOG_CHART.to_owned(), isolate(station, LOG_CHART, chart));
            }
            let chart = table_chart(value, dim, source_len, &axis);
            charts.insert(dim.stem().to_owned(), isolate(station, dim.stem(), chart));
        }

        Ok(Self {
            station: station.to_owned(),
            granularity,
            dates: axis.labels,
            charts,
        })
    }

    /// Load `<dir>/<station>_graph.json` and build the view.
    pub fn load(dir: &Path, station: &str, granularity: Granularity) -> Result<Self, ArtifactError> {
        let path = artifact_path(dir, station)?;
        let value = read_artifact_value(&path)?;
        Self::from_value(station, &value, granularity).map_err(|e| ArtifactError::Malformed {
            path,
            message: e.to_string(),
        })
    }

    pub fn chart(&self, name: &str) -> Option<&ChartState> {
        self.charts.get(name)
    }

    pub fn failed_charts(&self) -> usize {
        self.charts.values().filter(|c| !c.is_ready()).count()
    }
}

fn table_chart(value: &Value, dim: Dimension, source_len: usize, axis: &CoarseAxis) -> Result<ChartState, ShapeError> {
    let key = Granularity::Hour.table_key(dim);
    let raw = value.get(&key).ok_or_else(|| ShapeError::missing(&key))?;
    let hourly = CountTable::from_json(dim, raw, source_len)?;
    reaggregate_table(&hourly, axis).map(ChartState::from_table)
}

fn log_chart(value: &Value, source_len: usize, axis: &CoarseAxis) -> Result<ChartState, ShapeError> {
    let key = Granularity::Hour.log_key();
    let raw = value.get(&key).ok_or_else(|| ShapeError::missing(&key))?;
    let hourly = parse_counts(&key, raw, source_len)?;
    sum_series(&key, &hourly, axis).map(ChartState::from_log)
}

fn isolate(station: &str, chart: &str, result: Result<ChartState, ShapeError>) -> ChartState {
    result.unwrap_or_else(|e| {
        warn!(station, chart, error = %e, "Chart unavailable");
        ChartState::Error {
            message: e.to_string(),
        }
    })
}
