// crates/db/src/queries/mod.rs
// Record store and rollup-run queries.

pub mod records;
pub mod runs;
