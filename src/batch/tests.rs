use serde_json::{json, Value};

use super::*;
use crate::config::BackoffConfig;
use crate::storage::{KeySchema, MemoryDocumentStore, StoreError};

const TABLE: &str = "users";

fn store() -> Arc<MemoryDocumentStore> {
    Arc::new(MemoryDocumentStore::new().with_table(TABLE, KeySchema::new("userId")))
}

fn writer(store: &Arc<MemoryDocumentStore>, config: BatchConfig) -> BatchWriter {
    BatchWriter::new(store.clone(), config).unwrap()
}

fn items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            let value: Value = json!({"userId": format!("u-{:03}", i), "n": i});
            value.as_object().cloned().unwrap()
        })
        .collect()
}

#[tokio::test]
async fn test_empty_input_makes_no_calls() {
    let store = store();
    let outcome = writer(&store, BatchConfig::default())
        .batch_put(TABLE, Vec::new())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.processed_items_count, 0);
    assert!(store.batch_calls().await.is_empty());
}

#[tokio::test]
async fn test_chunks_are_consecutive_and_bounded() {
    let store = store();
    let outcome = writer(&store, BatchConfig::default())
        .batch_put(TABLE, items(60))
        .await
        .unwrap();

    let sizes: Vec<usize> = store.batch_calls().await.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![25, 25, 10]);
    assert_eq!(store.batch_calls().await[1][0], WriteRequest::Put(items(60)[25].clone()));
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(store.item_count(TABLE).await, 60);
}

#[tokio::test]
async fn test_smaller_batch_size() {
    let store = store();
    let config = BatchConfig {
        batch_size: 10,
        ..BatchConfig::default()
    };
    writer(&store, config)
        .batch_put(TABLE, items(25))
        .await
        .unwrap();

    let sizes: Vec<usize> = store.batch_calls().await.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[tokio::test]
async fn test_retry_resubmits_only_unprocessed() {
    let store = store();
    store
        .set_unprocessed_policy(|call, _| if call == 0 { 3 } else { 0 })
        .await;

    let outcome = writer(&store, BatchConfig::default())
        .batch_put(TABLE, items(10))
        .await
        .unwrap();

    let calls = store.batch_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], calls[0][..3].to_vec());
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.processed_items_count, 10);
}

#[tokio::test]
async fn test_attempt_ceiling_reports_leftovers() {
    let store = store();
    store.set_unprocessed_policy(|_, requests| requests.len()).await;
    let config = BatchConfig {
        max_attempts: 3,
        ..BatchConfig::default()
    };

    let outcome = writer(&store, config)
        .batch_put(TABLE, items(30))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.unprocessed_items_count, 30);
    assert_eq!(outcome.processed_items_count, 0);
    assert_eq!(
        outcome.unprocessed_items,
        items(30).into_iter().map(WriteRequest::Put).collect::<Vec<_>>()
    );
    assert_eq!(store.batch_calls().await.len(), 6);
}

#[tokio::test]
async fn test_batch_delete() {
    let store = store();
    writer(&store, BatchConfig::default())
        .batch_put(TABLE, items(30))
        .await
        .unwrap();

    let keys = (0..30)
        .map(|i| Key::new("userId", format!("u-{:03}", i)))
        .collect();
    let outcome = writer(&store, BatchConfig::default())
        .batch_delete(TABLE, keys)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.processed_items_count, 30);
    assert_eq!(store.item_count(TABLE).await, 0);
}

#[tokio::test]
async fn test_call_failure_propagates() {
    let store = store();
    store.set_fail_on_batch(true).await;

    let result = writer(&store, BatchConfig::default())
        .batch_put(TABLE, items(5))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::Backend {
            operation: "BatchWriteItem",
            ..
        })
    ));
}

#[tokio::test]
async fn test_concurrent_chunks_keep_accounting() {
    let store = store();
    store.set_unprocessed_policy(|call, _| if call < 4 { 2 } else { 0 }).await;
    let config = BatchConfig {
        concurrency: 4,
        ..BatchConfig::default()
    };

    let outcome = writer(&store, config)
        .batch_put(TABLE, items(100))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(store.batch_calls().await.len(), 5);
    assert_eq!(store.item_count(TABLE).await, 100);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_between_passes() {
    let store = store();
    store.set_unprocessed_policy(|_, requests| requests.len()).await;
    let config = BatchConfig {
        max_attempts: 4,
        backoff: Some(BackoffConfig {
            min_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: false,
        }),
        ..BatchConfig::default()
    };

    let started = tokio::time::Instant::now();
    let outcome = writer(&store, config)
        .batch_put(TABLE, items(1))
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 4);
    assert!(started.elapsed() >= std::time::Duration::from_millis(700));
}

#[test]
fn test_invalid_config_rejected() {
    let config = BatchConfig {
        max_attempts: 0,
        ..BatchConfig::default()
    };
    assert!(BatchWriter::new(Arc::new(MemoryDocumentStore::new()), config).is_err());
}

#[test]
fn test_outcome_serializes_camel_case() {
    let outcome = BatchOutcome::new(3, Vec::new(), 1);
    let value = serde_json::to_value(&outcome).unwrap();

    assert_eq!(value["success"], json!(true));
    assert_eq!(value["processedItemsCount"], json!(3));
    assert_eq!(value["unprocessedItemsCount"], json!(0));
    assert_eq!(value["unprocessedItems"], json!([]));
}

/// Reports every request it was sent as unprocessed, twice over.
struct OverReportingStore;

#[async_trait::async_trait]
impl DocumentStore for OverReportingStore {
    async fn get_item(&self, _table: &str, _key: &Key) -> Result<Option<Item>> {
        Ok(None)
    }

    async fn put_item(&self, _table: &str, _item: Item) -> Result<Option<Item>> {
        Ok(None)
    }

    async fn delete_item(&self, _table: &str, _key: &Key) -> Result<Option<Item>> {
        Ok(None)
    }

    async fn batch_write(
        &self,
        _table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>> {
        let mut unprocessed = requests.clone();
        unprocessed.extend(requests);
        Ok(unprocessed)
    }

    async fn scan(&self, _table: &str) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_over_reported_unprocessed_is_capped_per_chunk() {
    let config = BatchConfig {
        max_attempts: 3,
        ..BatchConfig::default()
    };
    let writer = BatchWriter::new(Arc::new(OverReportingStore), config).unwrap();

    let outcome = writer.batch_put(TABLE, items(30)).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.unprocessed_items_count, 30);
    assert_eq!(outcome.processed_items_count, 0);
    assert_eq!(
        outcome.processed_items_count + outcome.unprocessed_items_count,
        30
    );
}
