// crates/core/src/artifact.rs
//! The rollup artifact: a `dates` axis plus one dense count table per
//! dimension, and its on-disk JSON form.
//!
//! Serialization is hand-written so key order is fixed (identical input
//! produces byte-identical files) and so each table can carry its
//! `<field>_index` list next to the per-value series.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ArtifactError, ShapeError};
use crate::types::{stringify_category, Dimension, NULL_SENTINEL};

/// File name suffix of a station artifact: `<station>_graph.json`.
pub const ARTIFACT_SUFFIX: &str = "_graph.json";

/// Width of a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn name(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }

    /// Key suffix substituted throughout the artifact.
    pub fn suffix(self) -> &'static str {
        match self {
            Granularity::Hour => "per_hour",
            Granularity::Day => "per_day",
            Granularity::Month => "per_month",
        }
    }

    /// Length of a bucket label (`YYYY-MM-DD-HH`, `YYYY-MM-DD`, `YYYY-MM`).
    pub fn label_width(self) -> usize {
        match self {
            Granularity::Hour => 13,
            Granularity::Day => 10,
            Granularity::Month => 7,
        }
    }

    pub fn table_key(self, dim: Dimension) -> String {
        format!("{}_counts_{}", dim.stem(), self.suffix())
    }

    pub fn log_key(self) -> String {
        format!("log_counts_{}", self.suffix())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Ok(Granularity::Hour),
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dense counts for one dimension.
///
/// Key order is the index: the order in which values were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    series: IndexMap<String, Vec<u64>>,
}

impl CountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct values in first-seen order.
    pub fn index(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn get(&self, value: &str) -> Option<&[u64]> {
        self.series.get(value).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u64])> {
        self.series.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn insert(&mut self, value: impl Into<String>, counts: Vec<u64>) {
        self.series.insert(value.into(), counts);
    }

    /// The series for `value`, created zero-filled at `width` on first sight.
    pub(crate) fn series_mut(&mut self, value: &str, width: usize) -> &mut Vec<u64> {
        match self.series.get_index_of(value) {
            Some(i) => &mut self.series[i],
            None => self
                .series
                .entry(value.to_owned())
                .or_insert_with(|| vec![0; width]),
        }
    }

    pub fn total(&self, value: &str) -> u64 {
        self.get(value).map(|s| s.iter().sum()).unwrap_or(0)
    }

    /// Parse a table from its JSON object, requiring every series to have
    /// `expected_len` entries.
    pub fn from_json(dim: Dimension, value: &Value, expected_len: usize) -> Result<Self, ShapeError> {
        let index_key = dim.index_key();
        let obj = value
            .as_object()
            .ok_or_else(|| ShapeError::wrong_type(dim.stem(), "object"))?;
        let index = obj
            .get(&index_key)
            .ok_or_else(|| ShapeError::missing(&index_key))?
            .as_array()
            .ok_or_else(|| ShapeError::wrong_type(&index_key, "array"))?;

        let mut table = CountTable::new();
        for entry in index {
            let name = stringify_category(entry).unwrap_or_else(|| NULL_SENTINEL.to_owned());
            let raw = obj.get(&name).ok_or_else(|| ShapeError::missing(&name))?;
            let counts = parse_counts(&name, raw, expected_len)?;
            table.insert(name, counts);
        }
        Ok(table)
    }
}

/// Parse a JSON array of non-negative integer counts of a known length.
pub fn parse_counts(key: &str, value: &Value, expected_len: usize) -> Result<Vec<u64>, ShapeError> {
    let items = value
        .as_array()
        .ok_or_else(|| ShapeError::wrong_type(key, "array"))?;
    if items.len() != expected_len {
        return Err(ShapeError::LengthMismatch {
            key: key.to_owned(),
            expected: expected_len,
            actual: items.len(),
        });
    }
    items
        .iter()
        .enumerate()
        .map(|(position, v)| {
            v.as_u64().ok_or_else(|| ShapeError::BadCount {
                key: key.to_owned(),
                position,
            })
        })
        .collect()
}

/// Parse the `dates` axis.
pub fn parse_dates(value: &Value) -> Result<Vec<String>, ShapeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ShapeError::wrong_type("artifact", "object"))?;
    let dates = obj
        .get("dates")
        .ok_or_else(|| ShapeError::missing("dates"))?
        .as_array()
        .ok_or_else(|| ShapeError::wrong_type("dates", "array"))?;
    dates
        .iter()
        .map(|d| {
            d.as_str()
                .map(str::to_owned)
                .ok_or_else(|| ShapeError::wrong_type("dates", "array of strings"))
        })
        .collect()
}

/// The computed rollup for one station and time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupArtifact {
    pub granularity: Granularity,
    pub dates: Vec<String>,
    pub tables: IndexMap<Dimension, CountTable>,
    pub log_counts: Vec<u64>,
}

impl RollupArtifact {
    /// An artifact on `dates` with every table empty and log counts zeroed.
    pub fn empty(granularity: Granularity, dates: Vec<String>) -> Self {
        let log_counts = vec![0; dates.len()];
        Self {
            granularity,
            dates,
            tables: Dimension::ALL
                .into_iter()
                .map(|d| (d, CountTable::new()))
                .collect(),
            log_counts,
        }
    }

    pub fn table(&self, dim: Dimension) -> Option<&CountTable> {
        self.tables.get(&dim)
    }

    /// Check that every series is aligned to `dates` and that no value
    /// shadows its table's index key.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let expected = self.dates.len();
        if self.log_counts.len() != expected {
            return Err(ShapeError::LengthMismatch {
                key: self.granularity.log_key(),
                expected,
                actual: self.log_counts.len(),
            });
        }
        for dim in Dimension::ALL {
            let table = self
                .tables
                .get(&dim)
                .ok_or_else(|| ShapeError::missing(self.granularity.table_key(dim)))?;
            let index_key = dim.index_key();
            if table.get(&index_key).is_some() {
                return Err(ShapeError::ReservedValue { key: index_key });
            }
            for (value, counts) in table.iter() {
                if counts.len() != expected {
                    return Err(ShapeError::LengthMismatch {
                        key: value.to_owned(),
                        expected,
                        actual: counts.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Strict parse. Any missing key or misaligned series fails the whole artifact.
    pub fn from_json(value: &Value, granularity: Granularity) -> Result<Self, ShapeError> {
        let dates = parse_dates(value)?;
        // parse_dates already proved this is an object.
        let obj = value
            .as_object()
            .ok_or_else(|| ShapeError::wrong_type("artifact", "object"))?;

        let log_key = granularity.log_key();
        let log_counts = parse_counts(
            &log_key,
            obj.get(&log_key).ok_or_else(|| ShapeError::missing(&log_key))?,
            dates.len(),
        )?;

        let mut tables = IndexMap::new();
        for dim in Dimension::ALL {
            let key = granularity.table_key(dim);
            let raw = obj.get(&key).ok_or_else(|| ShapeError::missing(&key))?;
            tables.insert(dim, CountTable::from_json(dim, raw, dates.len())?);
        }

        Ok(Self {
            granularity,
            dates,
            tables,
            log_counts,
        })
    }

    /// Pretty-printed JSON bytes with a trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

struct TableView<'a> {
    dim: Dimension,
    table: Option<&'a CountTable>,
}

impl Serialize for TableView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.table.map_or(0, CountTable::len);
        let mut map = serializer.serialize_map(Some(len + 1))?;
        map.serialize_entry(&self.dim.index_key(), &IndexView(self.table))?;
        if let Some(table) = self.table {
            for (value, counts) in table.iter() {
                map.serialize_entry(value, counts)?;
            }
        }
        map.end()
    }
}

struct IndexView<'a>(Option<&'a CountTable>);

impl Serialize for IndexView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.map_or(0, CountTable::len)))?;
        if let Some(table) = self.0 {
            for value in table.index() {
                seq.serialize_element(value)?;
            }
        }
        seq.end()
    }
}

impl Serialize for RollupArtifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Dimension::ALL.len() + 2))?;
        map.serialize_entry("dates", &self.dates)?;
        for dim in Dimension::ALL {
            // Log counts sit between repo and group in the published layout.
            if dim == Dimension::Group {
                map.serialize_entry(&self.granularity.log_key(), &self.log_counts)?;
            }
            let view = TableView {
                dim,
                table: self.tables.get(&dim),
            };
            map.serialize_entry(&self.granularity.table_key(dim), &view)?;
        }
        map.end()
    }
}

// ============================================================================
// Files
// ============================================================================

/// Reject identifiers that could escape the artifact directory.
pub fn validate_station_id(station: &str) -> Result<(), ArtifactError> {
    let bad = station.is_empty()
        || station == "."
        || station == ".."
        || station.contains(['/', '\\', '\0']);
    if bad {
        return Err(ArtifactError::InvalidStation {
            station: station.to_owned(),
        });
    }
    Ok(())
}

/// `<dir>/<station>_graph.json`.
pub fn artifact_path(dir: &Path, station: &str) -> Result<PathBuf, ArtifactError> {
    validate_station_id(station)?;
    Ok(dir.join(format!("{station}{ARTIFACT_SUFFIX}")))
}

/// Write the artifact for `station`, replacing any previous one atomically.
///
/// The bytes go to a temporary file in the same directory which is then
/// renamed over the final path, so readers see either the old file or the
/// complete new one.
pub fn write_artifact(
    dir: &Path,
    station: &str,
    artifact: &RollupArtifact,
) -> Result<PathBuf, ArtifactError> {
    let path = artifact_path(dir, station)?;
    artifact.validate().map_err(|e| ArtifactError::Malformed {
        path: path.clone(),
        message: e.to_string(),
    })?;
    std::fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;

    let bytes = artifact.to_json_bytes()?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(dir, e))?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ArtifactError::io(tmp.path(), e))?;
    tmp.persist(&path)
        .map_err(|e| ArtifactError::io(&path, e.error))?;

    debug!(station, path = %path.display(), bytes = bytes.len(), "Artifact written");
    Ok(path)
}

/// Read an artifact file as untyped JSON.
pub fn read_artifact_value(path: &Path) -> Result<Value, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Malformed {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

/// Read and strictly validate an hourly artifact.
pub fn load_hourly_artifact(path: &Path) -> Result<RollupArtifact, ArtifactError> {
    let value = read_artifact_value(path)?;
    RollupArtifact::from_json(&value, Granularity::Hour).map_err(|e| ArtifactError::Malformed {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

/// Station ids that have an artifact in `dir`, sorted. A missing directory
/// simply has no artifacts.
pub fn list_artifacts(dir: &Path) -> Result<Vec<String>, ArtifactError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ArtifactError::io(dir, e)),
    };
    let mut stations: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let station = name.strip_suffix(ARTIFACT_SUFFIX)?;
            (!station.is_empty()).then(|| station.to_owned())
        })
        .collect();
    stations.sort();
    Ok(stations)
}
