//! In-memory document store.
//!
//! Backs tests and `--dry-run` invocations. Failures can be injected per
//! operation, and batch writes can be told to report part of each batch as
//! unprocessed, the way a throttled DynamoDB table does.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    check_batch_size, DocumentStore, Item, Key, KeySchema, Result, StoreError, WriteRequest,
};

/// Decides how many leading requests of a batch call go unprocessed.
///
/// Receives the zero-based index of the batch call and the requests it carries.
type UnprocessedPolicy = Box<dyn Fn(usize, &[WriteRequest]) -> usize + Send + Sync>;

struct Table {
    schema: KeySchema,
    items: BTreeMap<String, Item>,
}

/// Mock document store that keeps tables in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    tables: RwLock<HashMap<String, Table>>,
    fail_on_get: RwLock<bool>,
    fail_on_put: RwLock<bool>,
    fail_on_delete: RwLock<bool>,
    fail_on_batch: RwLock<bool>,
    unprocessed_policy: RwLock<Option<UnprocessedPolicy>>,
    batch_calls: RwLock<Vec<Vec<WriteRequest>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table registration.
    pub fn with_table(mut self, name: impl Into<String>, schema: KeySchema) -> Self {
        self.tables.get_mut().insert(
            name.into(),
            Table {
                schema,
                items: BTreeMap::new(),
            },
        );
        self
    }

    pub async fn create_table(&self, name: impl Into<String>, schema: KeySchema) {
        self.tables.write().await.insert(
            name.into(),
            Table {
                schema,
                items: BTreeMap::new(),
            },
        );
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    pub async fn set_fail_on_put(&self, fail: bool) {
        *self.fail_on_put.write().await = fail;
    }

    pub async fn set_fail_on_delete(&self, fail: bool) {
        *self.fail_on_delete.write().await = fail;
    }

    pub async fn set_fail_on_batch(&self, fail: bool) {
        *self.fail_on_batch.write().await = fail;
    }

    /// Report the first `policy(call, requests)` requests of each batch call
    /// as unprocessed. Unprocessed requests are not applied.
    pub async fn set_unprocessed_policy<F>(&self, policy: F)
    where
        F: Fn(usize, &[WriteRequest]) -> usize + Send + Sync + 'static,
    {
        *self.unprocessed_policy.write().await = Some(Box::new(policy));
    }

    pub async fn clear_unprocessed_policy(&self) {
        *self.unprocessed_policy.write().await = None;
    }

    /// Every batch call received so far, in order.
    pub async fn batch_calls(&self) -> Vec<Vec<WriteRequest>> {
        self.batch_calls.read().await.clone()
    }

    /// All items of a table, in key order.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn item_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.items.len())
            .unwrap_or(0)
    }

    fn injected(operation: &'static str) -> StoreError {
        StoreError::Backend {
            operation,
            message: "injected failure".to_string(),
        }
    }
}

/// Order-independent index for a key.
fn index_of(key: &Key) -> String {
    let mut parts: Vec<String> = key
        .attributes()
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    parts.sort();
    parts.join("|")
}

/// Resolve the index of every request before touching the table, so an
/// invalid request rejects the whole call.
fn plan(table: &Table, requests: Vec<WriteRequest>) -> Result<Vec<(String, Option<Item>)>> {
    requests
        .into_iter()
        .map(|request| match request {
            WriteRequest::Put(item) => Ok((index_of(&table.schema.key_of(&item)?), Some(item))),
            WriteRequest::Delete(key) => Ok((index_of(&key), None)),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        if *self.fail_on_get.read().await {
            return Err(Self::injected("GetItem"));
        }
        let tables = self.tables.read().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.get(&index_of(key)).cloned())
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<Option<Item>> {
        if *self.fail_on_put.read().await {
            return Err(Self::injected("PutItem"));
        }
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let key = table.schema.key_of(&item)?;
        Ok(table.items.insert(index_of(&key), item))
    }

    async fn delete_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        if *self.fail_on_delete.read().await {
            return Err(Self::injected("DeleteItem"));
        }
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.remove(&index_of(key)))
    }

    async fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>> {
        check_batch_size(requests.len())?;
        if *self.fail_on_batch.read().await {
            return Err(Self::injected("BatchWriteItem"));
        }

        let mut tables = self.tables.write().await;
        let target = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let mut calls = self.batch_calls.write().await;
        let call_index = calls.len();
        calls.push(requests.clone());

        let rejected = match self.unprocessed_policy.read().await.as_ref() {
            Some(policy) => policy(call_index, &requests).min(requests.len()),
            None => 0,
        };

        let mut requests = requests;
        let processed = requests.split_off(rejected);
        for (index, item) in plan(target, processed)? {
            match item {
                Some(item) => {
                    target.items.insert(index, item);
                }
                None => {
                    target.items.remove(&index);
                }
            }
        }

        Ok(requests)
    }

    async fn scan(&self, table: &str) -> Result<Vec<Item>> {
        let tables = self.tables.read().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.values().cloned().collect())
    }
}
