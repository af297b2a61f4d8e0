//! Chunked batch writes with unprocessed-item retry.
//!
//! Splits a request list into store-sized chunks, writes them, and resubmits
//! only what the store reports as unprocessed until nothing is left or the
//! pass ceiling is reached. Items that never make it are handed back in the
//! [`BatchOutcome`] rather than raised as an error.
//!
//! A batch call that fails outright aborts the whole operation with that
//! error; only unprocessed reporting inside a successful response is retried.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BatchConfig, ConfigError};
use crate::storage::{DocumentStore, Item, Key, Result, WriteRequest};
use crate::utils::retry::pass_delays;

pub use crate::config::DEFAULT_MAX_ATTEMPTS as MAX_ATTEMPTS;

/// Result of one `batch_write` invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// True when every request was processed.
    pub success: bool,
    pub processed_items_count: usize,
    pub unprocessed_items_count: usize,
    /// Requests still unprocessed after the last pass, verbatim.
    pub unprocessed_items: Vec<WriteRequest>,
    /// Passes performed.
    pub attempts: usize,
}

impl BatchOutcome {
    fn new(submitted: usize, unprocessed: Vec<WriteRequest>, attempts: usize) -> Self {
        Self {
            success: unprocessed.is_empty(),
            processed_items_count: submitted.saturating_sub(unprocessed.len()),
            unprocessed_items_count: unprocessed.len(),
            unprocessed_items: unprocessed,
            attempts,
        }
    }
}

/// Batch write engine over a [`DocumentStore`].
pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
    config: BatchConfig,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: BatchConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Write every request, retrying unprocessed ones.
    pub async fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchOutcome> {
        let submitted = requests.len();
        let mut delays = self
            .config
            .backoff
            .as_ref()
            .map(|backoff| pass_delays(backoff, self.config.max_attempts).into_iter());

        let mut pending = requests;
        let mut attempts = 0;

        while !pending.is_empty() && attempts < self.config.max_attempts {
            if attempts > 0 {
                if let Some(delay) = delays.as_mut().and_then(|d| d.next()) {
                    debug!(table = %table, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                }
            }

            let in_pass = pending.len();
            pending = self.write_pass(table, pending).await?;
            attempts += 1;

            debug!(
                table = %table,
                attempt = attempts,
                submitted = in_pass,
                unprocessed = pending.len(),
                "Batch pass complete"
            );
        }

        let outcome = BatchOutcome::new(submitted, pending, attempts);

        if outcome.success {
            info!(
                table = %table,
                processed = outcome.processed_items_count,
                attempts = outcome.attempts,
                "Batch write complete"
            );
        } else {
            warn!(
                table = %table,
                processed = outcome.processed_items_count,
                unprocessed = outcome.unprocessed_items_count,
                attempts = outcome.attempts,
                "Batch write gave up with unprocessed items"
            );
        }

        Ok(outcome)
    }

    /// Put every item.
    pub async fn batch_put(&self, table: &str, items: Vec<Item>) -> Result<BatchOutcome> {
        self.batch_write(table, items.into_iter().map(WriteRequest::Put).collect())
            .await
    }

    /// Delete every key.
    pub async fn batch_delete(&self, table: &str, keys: Vec<Key>) -> Result<BatchOutcome> {
        self.batch_write(table, keys.into_iter().map(WriteRequest::Delete).collect())
            .await
    }

    /// One pass: every chunk written once, unprocessed requests collected in
    /// chunk order once all chunks have returned.
    async fn write_pass(
        &self,
        table: &str,
        mut pending: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>> {
        let mut chunks = Vec::with_capacity(pending.len().div_ceil(self.config.batch_size));
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(self.config.batch_size));
            chunks.push(std::mem::replace(&mut pending, rest));
        }

        let unprocessed: Vec<Vec<WriteRequest>> = stream::iter(chunks)
            .map(|chunk| async move {
                let sent = chunk.len();
                let mut unprocessed = self.store.batch_write(table, chunk).await?;
                if unprocessed.len() > sent {
                    warn!(
                        table = %table,
                        sent,
                        reported = unprocessed.len(),
                        "Store reported more unprocessed requests than sent"
                    );
                    unprocessed.truncate(sent);
                }
                Ok::<_, crate::storage::StoreError>(unprocessed)
            })
            .buffered(self.config.concurrency)
            .try_collect()
            .await?;

        Ok(unprocessed.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests;
