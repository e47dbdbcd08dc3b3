//! Integration tests for station record import and time-bounded reads.

use serde_json::json;
use station_view_core::{parse_range_bound, TimeRange};
use station_view_db::Database;

fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::new(
        parse_range_bound(start).unwrap(),
        parse_range_bound(end).unwrap(),
    )
}

#[tokio::test]
async fn test_insert_and_count() {
    let db = Database::new_in_memory().await.unwrap();
    let written = db
        .insert_documents(
            "StationL",
            &[
                json!({"_id": {"$oid": "abc"}, "dtime": "2024-01-01 00:05:00", "module": "A"}),
                json!({"dtime": "2024-01-01 01:05:00"}),
            ],
        )
        .await
        .unwrap();
    assert_eq!(written, 2);
    assert_eq!(db.count_documents("StationL").await.unwrap(), 2);
    assert_eq!(db.count_documents("other").await.unwrap(), 0);

    let docs = db
        .fetch_documents("StationL", &range("2024-01-01", "2024-01-02"), 10)
        .await
        .unwrap();
    assert_eq!(docs[0].record_id.as_deref(), Some("abc"));
    assert_eq!(docs[1].record_id, None);
    assert_eq!(docs[0].body["module"], "A");
}

#[tokio::test]
async fn test_fetch_is_time_bounded_and_station_scoped() {
    let db = Database::new_in_memory().await.unwrap();
    db.insert_documents(
        "S1",
        &[
            json!({"dtime": "2023-12-31 23:59:59"}),
            json!({"dtime": "2024-01-01 00:00:00"}),
            json!({"dtime": "2024-01-01 12:00:00"}),
            json!({"dtime": "2024-01-02 00:00:00"}),
            json!({"dtime": "2024-01-02 00:00:01"}),
        ],
    )
    .await
    .unwrap();
    db.insert_documents("S2", &[json!({"dtime": "2024-01-01 06:00:00"})])
        .await
        .unwrap();

    let docs = db
        .fetch_documents("S1", &range("2024-01-01", "2024-01-02"), 500)
        .await
        .unwrap();
    let times: Vec<&str> = docs.iter().map(|d| d.body["dtime"].as_str().unwrap()).collect();
    assert_eq!(
        times,
        vec!["2024-01-01 00:00:00", "2024-01-01 12:00:00", "2024-01-02 00:00:00"]
    );
}

#[tokio::test]
async fn test_unparseable_rows_are_returned_for_skipping() {
    let db = Database::new_in_memory().await.unwrap();
    db.insert_documents(
        "S1",
        &[json!({"dtime": "garbage"}), json!({"module": "A"}), json!({"dtime": "2024-01-01"})],
    )
    .await
    .unwrap();

    let docs = db
        .fetch_documents("S1", &range("2024-01-01", "2024-01-01 23:00"), 500)
        .await
        .unwrap();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs.iter().filter(|d| d.observed_at.is_none()).count(), 2);
}

#[tokio::test]
async fn test_pagination_visits_every_row_once() {
    let db = Database::new_in_memory().await.unwrap();
    let docs: Vec<_> = (0..23)
        .map(|i| json!({"dtime": format!("2024-01-01 {:02}:00:00", i), "n": i}))
        .collect();
    db.insert_documents("S1", &docs).await.unwrap();

    let r = range("2024-01-01", "2024-01-01 23:59");
    let first = db.fetch_documents_page("S1", &r, 0, 10).await.unwrap();
    assert_eq!(first.len(), 10);
    let second = db
        .fetch_documents_page("S1", &r, first.last().unwrap().row_id, 10)
        .await
        .unwrap();
    assert_eq!(second[0].body["n"], 10);

    for batch in [1, 7, 23, 100] {
        let all = db.fetch_documents("S1", &r, batch).await.unwrap();
        let ns: Vec<i64> = all.iter().map(|d| d.body["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, (0..23).collect::<Vec<_>>(), "batch size {batch}");
    }
}

#[tokio::test]
async fn test_inverted_range_reads_nothing() {
    let db = Database::new_in_memory().await.unwrap();
    db.insert_documents("S1", &[json!({"dtime": "garbage"})])
        .await
        .unwrap();
    let docs = db
        .fetch_documents("S1", &range("2024-01-02", "2024-01-01"), 10)
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_list_stations() {
    let db = Database::new_in_memory().await.unwrap();
    assert!(db.list_stations().await.unwrap().is_empty());
    for station in ["ZED", "ADBFI", "StationK", "ADBFI"] {
        db.insert_documents(station, &[json!({"dtime": "2024-01-01"})])
            .await
            .unwrap();
    }
    assert_eq!(
        db.list_stations().await.unwrap(),
        vec!["ADBFI", "StationK", "ZED"]
    );
}
