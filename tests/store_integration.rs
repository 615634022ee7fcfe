//! SQLite vector store tests against a temporary database.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map};
use tempfile::TempDir;

use vector_surfer::sqlite_store::SqliteStore;
use vector_surfer_core::models::{ExecutionRecord, ExecutionStatus, ReferenceRecord};
use vector_surfer_core::store::{ExecutionQuery, ReferenceQuery, Sort, SortField, VectorStore};

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn record(id: &str, function: &str, status: ExecutionStatus, seq: i64, duration_ms: f64) -> ExecutionRecord {
    let mut extra = Map::new();
    extra.insert("team".into(), json!("core"));
    ExecutionRecord {
        id: id.into(),
        function_name: function.into(),
        status,
        duration_ms,
        timestamp: base_time() + Duration::seconds(seq),
        span_id: format!("span-{}", id),
        trace_id: "trace-1".into(),
        error_code: None,
        error_message: None,
        input_preview: Some("in".into()),
        output_preview: None,
        vector: Some(vec![seq as f32, 1.0]),
        extra,
    }
}

async fn seeded_store(tmp: &TempDir) -> SqliteStore {
    let store = SqliteStore::open_initialized(&tmp.path().join("store.sqlite"))
        .await
        .unwrap();
    for (id, function, status, seq, duration) in [
        ("e1", "alpha", ExecutionStatus::Success, 1, 30.0),
        ("e2", "alpha", ExecutionStatus::Error, 2, 10.0),
        ("e3", "beta", ExecutionStatus::Success, 3, 20.0),
        ("e4", "alpha", ExecutionStatus::Success, 4, 40.0),
    ] {
        store
            .insert_execution(&record(id, function, status, seq, duration))
            .await
            .unwrap();
    }
    store
}

fn ids(records: &[ExecutionRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_fetch_round_trips_fields() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;

    let rec = store.get_execution("e3").await.unwrap().unwrap();
    assert_eq!(rec, record("e3", "beta", ExecutionStatus::Success, 3, 20.0));
    assert!(store.get_execution("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_filters_and_vector_inclusion() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;

    let all = store.fetch_executions(&ExecutionQuery::new(10)).await.unwrap();
    assert_eq!(ids(&all), vec!["e1", "e2", "e3", "e4"]);
    assert!(all.iter().all(|r| r.vector.is_none()));

    let alpha_ok = store
        .fetch_executions(
            &ExecutionQuery::new(10)
                .function(Some("alpha"))
                .status(ExecutionStatus::Success)
                .with_vectors(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&alpha_ok), vec!["e1", "e4"]);
    assert_eq!(alpha_ok[1].vector.as_deref(), Some(&[4.0f32, 1.0][..]));

    let window = store
        .fetch_executions(&ExecutionQuery::new(10).between(
            Some(base_time() + Duration::seconds(2)),
            Some(base_time() + Duration::seconds(3)),
        ))
        .await
        .unwrap();
    assert_eq!(ids(&window), vec!["e2", "e3"]);
}

#[tokio::test]
async fn test_fetch_sorting_and_limit() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;

    let newest = store
        .fetch_executions(&ExecutionQuery::new(2).sorted(Sort::newest_first()))
        .await
        .unwrap();
    assert_eq!(ids(&newest), vec!["e4", "e3"]);

    let fastest = store
        .fetch_executions(&ExecutionQuery::new(10).sorted(Sort {
            field: SortField::Duration,
            ascending: true,
        }))
        .await
        .unwrap();
    assert_eq!(ids(&fastest), vec!["e2", "e3", "e1", "e4"]);
}

#[tokio::test]
async fn test_function_names_sorted_distinct() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;
    assert_eq!(store.function_names().await.unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_reference_collection_created_on_first_insert() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;

    assert!(!store.has_references().await.unwrap());
    assert!(store
        .fetch_references(&ReferenceQuery::new(10))
        .await
        .unwrap()
        .is_empty());
    assert!(!store.delete_reference("nope").await.unwrap());
    assert!(store.reference_counts().await.unwrap().is_empty());

    let exec = store.get_execution("e1").await.unwrap().unwrap();
    let reference =
        ReferenceRecord::from_execution("g1".into(), &exec, "note", vec!["t".into()], base_time());
    store.insert_reference(&reference).await.unwrap();

    assert!(store.has_references().await.unwrap());
    let refs = store
        .fetch_references(&ReferenceQuery::new(10).function(Some("alpha")).with_vectors())
        .await
        .unwrap();
    assert_eq!(refs, vec![reference]);
    assert_eq!(
        store.reference_counts().await.unwrap(),
        vec![("alpha".to_string(), 1)]
    );

    assert!(store.delete_reference("g1").await.unwrap());
    assert!(!store.delete_reference("g1").await.unwrap());
}
