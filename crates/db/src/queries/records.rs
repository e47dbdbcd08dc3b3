//! Raw station documents: bulk import and time-bounded, paginated reads.

use crate::{Database, DbResult};
use serde_json::Value;
use sqlx::Row;
use station_view_core::{document_id, parse_document_time, RawDocument, TimeRange};
use tracing::debug;

/// One row of `station_records`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub row_id: i64,
    pub record_id: Option<String>,
    /// Parsed `dtime` in Unix seconds, `None` when unparseable.
    pub observed_at: Option<i64>,
    pub body: Value,
}

impl StoredDocument {
    /// Hand the document to the rollup builder. The row id stands in for a
    /// missing `_id`.
    pub fn into_raw(self) -> RawDocument {
        RawDocument::new(self.body, Some(self.row_id.to_string()))
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for StoredDocument {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let raw: String = row.try_get("document")?;
        let body = serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
            index: "document".into(),
            source: Box::new(e),
        })?;
        Ok(Self {
            row_id: row.try_get("id")?,
            record_id: row.try_get("record_id")?,
            observed_at: row.try_get("observed_at")?,
            body,
        })
    }
}

/// `dtime` of a document as Unix seconds, if it parses.
fn observed_at(doc: &Value) -> Option<i64> {
    let raw = doc.get("dtime")?;
    parse_document_time(raw)
        .ok()
        .map(|ts| ts.and_utc().timestamp())
}

impl Database {
    /// Insert documents for `station` in one transaction. Returns rows written.
    pub async fn insert_documents(&self, station: &str, docs: &[Value]) -> DbResult<u64> {
        let mut tx = self.pool().begin().await?;
        let mut written = 0u64;
        for doc in docs {
            let record_id = doc.get("_id").and_then(document_id);
            let body = serde_json::to_string(doc)?;
            let result = sqlx::query(
                "INSERT INTO station_records (station, record_id, observed_at, document) VALUES (?, ?, ?, ?)",
            )
            .bind(station)
            .bind(record_id)
            .bind(observed_at(doc))
            .bind(body)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        debug!(station, written, "Inserted station documents");
        Ok(written)
    }

    /// One page of documents for `station` in `range`, after `after_row_id`.
    ///
    /// Rows whose timestamp could not be parsed on import are included so the
    /// rollup can report them as skipped.
    pub async fn fetch_documents_page(
        &self,
        station: &str,
        range: &TimeRange,
        after_row_id: i64,
        limit: u32,
    ) -> DbResult<Vec<StoredDocument>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<StoredDocument> = sqlx::query_as(
            r#"
            SELECT id, record_id, observed_at, document
            FROM station_records
            WHERE station = ?1
              AND id > ?2
              AND (observed_at IS NULL OR observed_at BETWEEN ?3 AND ?4)
            ORDER BY id
            LIMIT ?5
            "#,
        )
        .bind(station)
        .bind(after_row_id)
        .bind(range.start.and_utc().timestamp())
        .bind(range.end.and_utc().timestamp())
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// All documents for `station` in `range`, read page by page.
    pub async fn fetch_documents(
        &self,
        station: &str,
        range: &TimeRange,
        batch_size: u32,
    ) -> DbResult<Vec<StoredDocument>> {
        let batch_size = batch_size.max(1);
        let mut out = Vec::new();
        let mut after = 0i64;
        loop {
            let page = self
                .fetch_documents_page(station, range, after, batch_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.row_id;
            let full = page.len() == batch_size as usize;
            out.extend(page);
            if !full {
                break;
            }
        }
        debug!(station, fetched = out.len(), "Fetched station documents");
        Ok(out)
    }

    /// Stations with at least one stored document, sorted.
    pub async fn list_stations(&self) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT station FROM station_records ORDER BY station")
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    pub async fn count_documents(&self, station: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM station_records WHERE station = ?")
            .bind(station)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observed_at() {
        assert_eq!(observed_at(&json!({"dtime": "1970-01-01 00:01:00.9"})), Some(60));
        assert_eq!(observed_at(&json!({"dtime": "later"})), None);
        assert_eq!(observed_at(&json!({})), None);
    }

    #[test]
    fn test_into_raw_uses_row_id_as_fallback() {
        let doc = StoredDocument {
            row_id: 12,
            record_id: None,
            observed_at: None,
            body: json!({"dtime": "2024-01-01"}),
        };
        let raw = doc.into_raw();
        assert_eq!(raw.fallback_id.as_deref(), Some("12"));
    }
}
