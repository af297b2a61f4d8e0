//! DynamoDB DocumentStore implementation.
//!
//! Items travel as JSON attribute maps and are converted to DynamoDB
//! attribute values with `serde_dynamo`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, PutRequest, ReturnValue, WriteRequest as DynamoWriteRequest,
};
use aws_sdk_dynamodb::Client;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use tracing::{debug, info};

use super::{check_batch_size, DocumentStore, Item, Key, Result, StoreError, WriteRequest};
use crate::config::StorageConfig;
use crate::utils::bootstrap::load_aws_config;

type Attributes = HashMap<String, AttributeValue>;

/// DynamoDB implementation of DocumentStore.
pub struct DynamoDocumentStore {
    client: Client,
}

impl DynamoDocumentStore {
    /// Create a store from the storage section of the configuration.
    pub async fn new(config: &StorageConfig) -> Self {
        let sdk_config = load_aws_config(config.region.as_deref()).await;

        let client = if let Some(endpoint) = config.endpoint_url.as_deref() {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(table = %config.profile_table, "Connected to DynamoDB");

        Self { client }
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn backend<E: std::error::Error>(operation: &'static str, error: E) -> StoreError {
    StoreError::Backend {
        operation,
        message: DisplayErrorContext(&error).to_string(),
    }
}

fn to_attributes(item: &Item) -> Result<Attributes> {
    to_item(item).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_attributes(attributes: Attributes) -> Result<Item> {
    from_item(attributes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn to_dynamo_request(request: &WriteRequest) -> Result<DynamoWriteRequest> {
    let built = match request {
        WriteRequest::Put(item) => {
            let put = PutRequest::builder()
                .set_item(Some(to_attributes(item)?))
                .build()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            DynamoWriteRequest::builder().put_request(put).build()
        }
        WriteRequest::Delete(key) => {
            let delete = DeleteRequest::builder()
                .set_key(Some(to_attributes(key.attributes())?))
                .build()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            DynamoWriteRequest::builder().delete_request(delete).build()
        }
    };
    Ok(built)
}

fn from_dynamo_request(request: DynamoWriteRequest) -> Result<Option<WriteRequest>> {
    if let Some(put) = request.put_request {
        return Ok(Some(WriteRequest::Put(from_attributes(put.item)?)));
    }
    if let Some(delete) = request.delete_request {
        let key = from_attributes(delete.key)?;
        return Ok(Some(WriteRequest::Delete(Key::from(key))));
    }
    Ok(None)
}

#[async_trait]
impl DocumentStore for DynamoDocumentStore {
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_attributes(key.attributes())?))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| backend("GetItem", e))?;

        output.item.map(from_attributes).transpose()
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<Option<Item>> {
        let output = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(to_attributes(&item)?))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| backend("PutItem", e))?;

        debug!(table = %table, "Stored item in DynamoDB");

        output.attributes.map(from_attributes).transpose()
    }

    async fn delete_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        // ALL_OLD hands back the removed item in the same call.
        let output = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(to_attributes(key.attributes())?))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| backend("DeleteItem", e))?;

        debug!(table = %table, key = %key, "Deleted item from DynamoDB");

        output.attributes.map(from_attributes).transpose()
    }

    async fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>> {
        check_batch_size(requests.len())?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let dynamo_requests = requests
            .iter()
            .map(to_dynamo_request)
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table, dynamo_requests)
            .send()
            .await
            .map_err(|e| backend("BatchWriteItem", e))?;

        let unprocessed = output
            .unprocessed_items
            .and_then(|mut tables| tables.remove(table))
            .unwrap_or_default();

        let mut pending = Vec::with_capacity(unprocessed.len());
        for request in unprocessed {
            if let Some(request) = from_dynamo_request(request)? {
                pending.push(request);
            }
        }

        debug!(
            table = %table,
            submitted = requests.len(),
            unprocessed = pending.len(),
            "BatchWriteItem complete"
        );

        Ok(pending)
    }

    async fn scan(&self, table: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<Attributes> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| backend("Scan", e))?;

            for attributes in output.items.unwrap_or_default() {
                items.push(from_attributes(attributes)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(table = %table, count = items.len(), "Scanned DynamoDB table");

        Ok(items)
    }
}
