//! Document store contract.
//!
//! The core only ever talks to a document store through [`DocumentStore`].
//! Items are opaque attribute maps; the store is told which attributes form
//! the key through a [`KeySchema`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod memory;

#[cfg(feature = "aws")]
pub mod dynamo;

pub use memory::MemoryDocumentStore;

#[cfg(feature = "aws")]
pub use dynamo::DynamoDocumentStore;

/// Maximum number of write requests a single batch call may carry.
pub const BATCH_SIZE: usize = 25;

/// A stored item: attribute name to value.
pub type Item = serde_json::Map<String, Value>;

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Batch of {size} write requests exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Item is missing key attribute '{attribute}'")]
    MissingKeyAttribute { attribute: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

/// The attributes that address exactly one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Item);

impl Key {
    /// Key with a single partition attribute.
    pub fn new(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut attributes = Item::new();
        attributes.insert(attribute.into(), value.into());
        Self(attributes)
    }

    /// Add another key attribute (typically the sort key).
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(attribute.into(), value.into());
        self
    }

    pub fn attributes(&self) -> &Item {
        &self.0
    }

    pub fn into_attributes(self) -> Item {
        self.0
    }
}

impl From<Item> for Key {
    fn from(attributes: Item) -> Self {
        Self(attributes)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match value {
                Value::String(s) => write!(f, "{}={}", name, s)?,
                other => write!(f, "{}={}", name, other)?,
            }
        }
        Ok(())
    }
}

/// Names of the key attributes of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl KeySchema {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Extract the key of an item.
    pub fn key_of(&self, item: &Item) -> Result<Key> {
        let partition = item.get(&self.partition_key).ok_or_else(|| {
            StoreError::MissingKeyAttribute {
                attribute: self.partition_key.clone(),
            }
        })?;
        let mut key = Key::new(self.partition_key.clone(), partition.clone());

        if let Some(sort_key) = &self.sort_key {
            let sort = item
                .get(sort_key)
                .ok_or_else(|| StoreError::MissingKeyAttribute {
                    attribute: sort_key.clone(),
                })?;
            key = key.with(sort_key.clone(), sort.clone());
        }

        Ok(key)
    }
}

/// One entry of a batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteRequest {
    Put(Item),
    Delete(Key),
}

/// Interface for the document store.
///
/// # Implementations
///
/// - `DynamoDocumentStore`: DynamoDB (feature `aws`)
/// - `MemoryDocumentStore`: in-memory store with failure injection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one item by key. Returns `None` if absent.
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>>;

    /// Write an item, replacing any item with the same key.
    ///
    /// Returns the replaced item, if there was one.
    async fn put_item(&self, table: &str, item: Item) -> Result<Option<Item>>;

    /// Delete one item by key, returning the removed item atomically.
    async fn delete_item(&self, table: &str, key: &Key) -> Result<Option<Item>>;

    /// Write up to [`BATCH_SIZE`] requests in one call.
    ///
    /// Returns the requests the store did not process. Larger batches are a
    /// caller error and fail with [`StoreError::BatchTooLarge`].
    async fn batch_write(&self, table: &str, requests: Vec<WriteRequest>)
        -> Result<Vec<WriteRequest>>;

    /// Read every item of a table, following pagination to the end.
    async fn scan(&self, table: &str) -> Result<Vec<Item>>;
}

/// Reject batches the store would refuse anyway.
pub(crate) fn check_batch_size(size: usize) -> Result<()> {
    if size > BATCH_SIZE {
        return Err(StoreError::BatchTooLarge {
            size,
            limit: BATCH_SIZE,
        });
    }
    Ok(())
}
