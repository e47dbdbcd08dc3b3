// crates/core/src/rollup.rs
//! Hourly rollup builder.
//!
//! Raw documents are parsed into [`EventRecord`]s (bad timestamps are logged
//! and skipped), then counted per `(hour, value)` for every dimension onto a
//! dense, zero-filled hour axis.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::artifact::{Granularity, RollupArtifact};
use crate::bucket::{hour_axis, TimeRange};
use crate::types::{Dimension, EventRecord, RawDocument};

/// Result of parsing a batch of raw documents.
#[derive(Debug, Default)]
pub struct DocumentScan {
    pub records: Vec<EventRecord>,
    /// Documents dropped because their timestamp was missing or unparseable.
    pub skipped: usize,
}

impl DocumentScan {
    pub fn push(&mut self, doc: &RawDocument) {
        match EventRecord::from_document(&doc.body, doc.fallback_id.clone()) {
            Ok(record) => self.records.push(record),
            Err(e) => {
                debug!(id = ?doc.fallback_id, error = %e, "Skipping record");
                self.skipped += 1;
            }
        }
    }
}

/// Parse documents into records. Never fails as a whole.
pub fn scan_documents<'a, I>(docs: I) -> DocumentScan
where
    I: IntoIterator<Item = &'a RawDocument>,
{
    let mut scan = DocumentScan::default();
    for doc in docs {
        scan.push(doc);
    }
    if scan.skipped > 0 {
        warn!(
            skipped = scan.skipped,
            parsed = scan.records.len(),
            "Skipped records with missing or unparseable dtime"
        );
    }
    scan
}

/// Build the hourly artifact for `range` from `records`.
///
/// Records are sorted by time (stable, so ties keep input order) before
/// counting; that ordering fixes the first-seen index of every table.
pub fn build_hourly_rollup<I>(records: I, range: &TimeRange) -> RollupArtifact
where
    I: IntoIterator<Item = EventRecord>,
{
    let mut records: Vec<EventRecord> = records.into_iter().collect();
    records.sort_by_key(|r| r.dtime);

    let dates = hour_axis(range);
    let width = dates.len();
    let mut artifact = RollupArtifact::empty(Granularity::Hour, dates);
    let mut ids_per_hour: Vec<HashSet<&str>> = vec![HashSet::new(); width];

    for record in &records {
        let Some(slot) = range.slot_of(record.dtime) else {
            continue;
        };
        for dim in Dimension::ALL {
            let table = artifact.tables.entry(dim).or_default();
            table.series_mut(&record.category(dim), width)[slot] += 1;
        }
        if let Some(id) = record.id.as_deref() {
            ids_per_hour[slot].insert(id);
        }
    }

    artifact.log_counts = ids_per_hour.iter().map(|ids| ids.len() as u64).collect();
    artifact
}

/// Number of records whose timestamp falls inside `range`.
pub fn count_in_range(records: &[EventRecord], range: &TimeRange) -> usize {
    records.iter().filter(|r| range.contains(r.dtime)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::parse_timestamp_str;
    use crate::types::NULL_SENTINEL;
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp_str(s).unwrap()
    }

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::new(ts(start), ts(end))
    }

    fn index(artifact: &RollupArtifact, dim: Dimension) -> Vec<String> {
        artifact
            .table(dim)
            .unwrap()
            .index()
            .map(str::to_owned)
            .collect()
    }

    fn counts(artifact: &RollupArtifact, dim: Dimension, value: &str) -> Vec<u64> {
        artifact.table(dim).unwrap().get(value).unwrap().to_vec()
    }

    #[test]
    fn test_three_record_scenario() {
        let records = vec![
            EventRecord::at(ts("2024-01-01 00:05:00"))
                .with_id("r1")
                .with(Dimension::Module, "A"),
            EventRecord::at(ts("2024-01-01 00:40:00"))
                .with_id("r2")
                .with(Dimension::Module, "B"),
            EventRecord::at(ts("2024-01-01 02:00:00")).with_id("r3"),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01-00", "2024-01-01-02"));

        assert_eq!(
            artifact.dates,
            vec!["2024-01-01-00", "2024-01-01-01", "2024-01-01-02"]
        );
        assert_eq!(index(&artifact, Dimension::Module), vec!["A", "B", "null"]);
        assert_eq!(counts(&artifact, Dimension::Module, "A"), vec![1, 0, 0]);
        assert_eq!(counts(&artifact, Dimension::Module, "B"), vec![1, 0, 0]);
        assert_eq!(counts(&artifact, Dimension::Module, "null"), vec![0, 0, 1]);
        assert_eq!(artifact.log_counts, vec![2, 0, 1]);
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_no_records_in_range_is_all_zero_full_length() {
        let records = vec![EventRecord::at(ts("2023-12-31 23:59:59")).with(Dimension::Repo, "fw")];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:00", "2024-01-01 05:00"));
        assert_eq!(artifact.dates.len(), 6);
        assert_eq!(artifact.log_counts, vec![0; 6]);
        for dim in Dimension::ALL {
            assert!(artifact.table(dim).unwrap().is_empty());
        }
    }

    #[test]
    fn test_inverted_range_keeps_shape() {
        let records = vec![EventRecord::at(ts("2024-01-01 12:00:00"))];
        let artifact = build_hourly_rollup(records, &range("2024-01-02", "2024-01-01"));
        assert!(artifact.dates.is_empty());
        assert!(artifact.log_counts.is_empty());
        assert_eq!(artifact.tables.len(), Dimension::ALL.len());
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["module_counts_per_hour"], json!({"module_index": []}));
    }

    #[test]
    fn test_null_bucket_only_when_a_record_lacks_the_field() {
        let records = vec![
            EventRecord::at(ts("2024-01-01 00:00:00")).with(Dimension::Method, "GET"),
            EventRecord::at(ts("2024-01-01 01:00:00")).with(Dimension::Method, "POST"),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:00", "2024-01-01 01:00"));
        assert_eq!(index(&artifact, Dimension::Method), vec!["GET", "POST"]);
        // Every record lacks a label, so the label table is just the sentinel.
        assert_eq!(index(&artifact, Dimension::Label), vec![NULL_SENTINEL]);
        assert_eq!(counts(&artifact, Dimension::Label, NULL_SENTINEL), vec![1, 1]);
    }

    #[test]
    fn test_null_outside_range_does_not_create_bucket() {
        let records = vec![
            EventRecord::at(ts("2024-01-01 00:10:00")).with(Dimension::Group, "g1"),
            EventRecord::at(ts("2024-01-03 00:00:00")),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:00", "2024-01-01 03:00"));
        assert_eq!(index(&artifact, Dimension::Group), vec!["g1"]);
    }

    #[test]
    fn test_index_is_first_seen_by_time_not_lexical() {
        // Input order is shuffled; the index follows timestamps.
        let records = vec![
            EventRecord::at(ts("2024-01-01 03:00:00")).with(Dimension::Repo, "alpha"),
            EventRecord::at(ts("2024-01-01 01:00:00")).with(Dimension::Repo, "zeta"),
            EventRecord::at(ts("2024-01-01 02:00:00")).with(Dimension::Repo, "mid"),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:00", "2024-01-01 03:00"));
        assert_eq!(index(&artifact, Dimension::Repo), vec!["zeta", "mid", "alpha"]);
    }

    #[test]
    fn test_value_first_seen_mid_range_is_zero_filled_from_the_start() {
        let records = vec![
            EventRecord::at(ts("2024-01-01 00:00:00")).with(Dimension::Module, "A"),
            EventRecord::at(ts("2024-01-01 04:30:00")).with(Dimension::Module, "NEW"),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:00", "2024-01-01 05:00"));
        assert_eq!(counts(&artifact, Dimension::Module, "NEW"), vec![0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_range_bounds_are_inclusive_and_unfloored() {
        let records = vec![
            EventRecord::at(ts("2024-01-01 00:29:59")).with(Dimension::Module, "early"),
            EventRecord::at(ts("2024-01-01 00:30:00")).with(Dimension::Module, "start"),
            EventRecord::at(ts("2024-01-01 01:15:00")).with(Dimension::Module, "end"),
            EventRecord::at(ts("2024-01-01 01:15:01")).with(Dimension::Module, "late"),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:30", "2024-01-01 01:15"));
        assert_eq!(index(&artifact, Dimension::Module), vec!["start", "end"]);
        assert_eq!(artifact.dates, vec!["2024-01-01-00", "2024-01-01-01"]);
    }

    #[test]
    fn test_log_counts_are_distinct_ids() {
        let records = vec![
            EventRecord::at(ts("2024-01-01 00:01:00")).with_id("x"),
            EventRecord::at(ts("2024-01-01 00:02:00")).with_id("x"),
            EventRecord::at(ts("2024-01-01 00:03:00")).with_id("y"),
            EventRecord::at(ts("2024-01-01 00:04:00")),
        ];
        let artifact = build_hourly_rollup(records, &range("2024-01-01 00:00", "2024-01-01 00:59"));
        assert_eq!(artifact.log_counts, vec![2]);
        // Dimension counts still include every record.
        assert_eq!(counts(&artifact, Dimension::Module, NULL_SENTINEL), vec![4]);
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let make = || {
            vec![
                EventRecord::at(ts("2024-02-01 10:00:00")).with_id("1").with(Dimension::Module, "m2"),
                EventRecord::at(ts("2024-02-01 10:00:00")).with_id("2").with(Dimension::Module, "m1"),
                EventRecord::at(ts("2024-02-01 12:00:00")).with_id("3").with(Dimension::Label, "l"),
            ]
        };
        let r = range("2024-02-01 09:00", "2024-02-01 13:00");
        let first = build_hourly_rollup(make(), &r).to_json_bytes().unwrap();
        let second = build_hourly_rollup(make(), &r).to_json_bytes().unwrap();
        assert_eq!(first, second);
        // Equal timestamps keep input order in the index.
        let artifact = build_hourly_rollup(make(), &r);
        assert_eq!(index(&artifact, Dimension::Module)[..2], ["m2", "m1"]);
    }

    #[test]
    fn test_scan_skips_bad_timestamps() {
        let docs = vec![
            RawDocument::new(json!({"dtime": "2024-01-01 00:00:00", "module": "A"}), Some("1".into())),
            RawDocument::new(json!({"dtime": "garbage", "module": "A"}), Some("2".into())),
            RawDocument::new(json!({"module": "A"}), Some("3".into())),
            RawDocument::new(json!({"dtime": "2024-01-01 01:00:00", "module": 5}), Some("4".into())),
        ];
        let scan = scan_documents(&docs);
        assert_eq!(scan.skipped, 2);
        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.records[1].module.as_deref(), Some("5"));
        assert_eq!(scan.records[1].id.as_deref(), Some("4"));

        let r = range("2024-01-01 00:00", "2024-01-01 01:00");
        assert_eq!(count_in_range(&scan.records, &r), 2);
        let artifact = build_hourly_rollup(scan.records, &r);
        assert_eq!(index(&artifact, Dimension::Module), vec!["A", "5"]);
    }
}
