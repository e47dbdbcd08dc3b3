// crates/core/src/reaggregate.rs
//! Hourly → daily / monthly re-aggregation.
//!
//! Pure and in-memory. Coarse labels are derived by truncating the source
//! labels; series are summed per coarse label in first-appearance order.

use indexmap::IndexMap;

use crate::artifact::{CountTable, Granularity, RollupArtifact};
use crate::error::ShapeError;

/// Mapping from a fine `dates` axis onto a coarser one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoarseAxis {
    pub granularity: Granularity,
    /// Coarse labels in the order they first appear.
    pub labels: Vec<String>,
    /// For each source slot, the index into `labels`.
    slots: Vec<usize>,
}

impl CoarseAxis {
    /// Derive the coarse axis for `dates` (labels of granularity `source`).
    pub fn derive(
        dates: &[String],
        source: Granularity,
        target: Granularity,
    ) -> Result<Self, ShapeError> {
        if target < source {
            return Err(ShapeError::FinerTarget {
                from: source.name(),
                to: target.name(),
            });
        }
        let width = target.label_width();
        let mut positions: IndexMap<&str, usize> = IndexMap::new();
        let mut slots = Vec::with_capacity(dates.len());
        for label in dates {
            let coarse = label
                .get(..width)
                .filter(|_| label.len() >= source.label_width())
                .ok_or_else(|| ShapeError::BadDateLabel {
                    label: label.clone(),
                    granularity: target.name(),
                })?;
            let next = positions.len();
            slots.push(*positions.entry(coarse).or_insert(next));
        }
        Ok(Self {
            granularity: target,
            labels: positions.into_keys().map(str::to_owned).collect(),
            slots,
        })
    }

    /// Length of the source axis this mapping was derived from.
    pub fn source_len(&self) -> usize {
        self.slots.len()
    }
}

/// Sum a fine series onto `axis`. The series must match the source axis length.
pub fn sum_series(key: &str, series: &[u64], axis: &CoarseAxis) -> Result<Vec<u64>, ShapeError> {
    if series.len() != axis.source_len() {
        return Err(ShapeError::LengthMismatch {
            key: key.to_owned(),
            expected: axis.source_len(),
            actual: series.len(),
        });
    }
    let mut out = vec![0u64; axis.labels.len()];
    for (&count, &slot) in series.iter().zip(&axis.slots) {
        out[slot] = out[slot]
            .checked_add(count)
            .ok_or_else(|| ShapeError::CountOverflow { key: key.to_owned() })?;
    }
    Ok(out)
}

/// Re-aggregate one table. The index is carried over unchanged.
pub fn reaggregate_table(table: &CountTable, axis: &CoarseAxis) -> Result<CountTable, ShapeError> {
    let mut out = CountTable::new();
    for (value, series) in table.iter() {
        out.insert(value, sum_series(value, series, axis)?);
    }
    Ok(out)
}

/// Produce the artifact at `target` granularity.
///
/// Fails on the first shape problem instead of returning a partial result.
pub fn reaggregate(
    artifact: &RollupArtifact,
    target: Granularity,
) -> Result<RollupArtifact, ShapeError> {
    let axis = CoarseAxis::derive(&artifact.dates, artifact.granularity, target)?;
    let log_counts = sum_series(&artifact.granularity.log_key(), &artifact.log_counts, &axis)?;

    let mut tables = IndexMap::with_capacity(artifact.tables.len());
    for (dim, table) in &artifact.tables {
        tables.insert(*dim, reaggregate_table(table, &axis)?);
    }

    Ok(RollupArtifact {
        granularity: target,
        dates: axis.labels,
        tables,
        log_counts,
    })
}
