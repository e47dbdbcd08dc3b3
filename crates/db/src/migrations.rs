/// Inline SQL migrations for the station-view record store.
///
/// One statement per entry; entries are applied in order and never edited
/// once released.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: raw station documents
    r#"
CREATE TABLE IF NOT EXISTS station_records (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    station     TEXT NOT NULL,
    record_id   TEXT,
    observed_at INTEGER,
    document    TEXT NOT NULL
);
"#,
    // Migration 2: time-bounded reads per station
    r#"
CREATE INDEX IF NOT EXISTS idx_station_records_station_time
    ON station_records(station, observed_at);
"#,
    // Migration 3: last rollup outcome per station
    r#"
CREATE TABLE IF NOT EXISTS rollup_runs (
    station          TEXT PRIMARY KEY,
    last_success_at  INTEGER,
    range_start      TEXT,
    range_end        TEXT,
    records_scanned  INTEGER NOT NULL DEFAULT 0,
    records_skipped  INTEGER NOT NULL DEFAULT 0,
    artifact_path    TEXT,
    last_error       TEXT,
    updated_at       INTEGER NOT NULL
);
"#,
];
