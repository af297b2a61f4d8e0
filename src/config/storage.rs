//! Document store configuration types.

use serde::Deserialize;

use super::ConfigError;
use crate::storage::KeySchema;

/// Sort key value of the single details item each principal owns.
pub const DEFAULT_PROFILE_SORT_VALUE: &str = "details";

/// Document store configuration.
///
/// Names the profile table and the attributes the profile items are keyed
/// and stamped with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Table holding profile items.
    pub profile_table: String,
    /// Partition key attribute. Holds the principal id.
    pub partition_key: String,
    /// Sort key attribute, if the table has one.
    pub sort_key: Option<String>,
    /// Value written to the sort key attribute of every profile item.
    pub sort_value: String,
    /// Attribute carrying the login handle.
    pub username_attribute: String,
    /// Attribute carrying the creation timestamp (RFC 3339).
    pub created_at_attribute: String,
    /// AWS region override. Falls back to the SDK's default chain.
    pub region: Option<String>,
    /// Endpoint override, e.g. a local DynamoDB.
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            profile_table: "users".to_string(),
            partition_key: "userId".to_string(),
            sort_key: Some("dataKey".to_string()),
            sort_value: DEFAULT_PROFILE_SORT_VALUE.to_string(),
            username_attribute: "userName".to_string(),
            created_at_attribute: "createdAt".to_string(),
            region: None,
            endpoint_url: None,
        }
    }
}

impl StorageConfig {
    /// Key schema of the profile table.
    pub fn key_schema(&self) -> KeySchema {
        let schema = KeySchema::new(self.partition_key.clone());
        match &self.sort_key {
            Some(sort_key) => schema.with_sort_key(sort_key.clone()),
            None => schema,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile_table.trim().is_empty() {
            return Err(ConfigError::invalid("storage.profile_table", "must not be empty"));
        }
        if self.partition_key.trim().is_empty() {
            return Err(ConfigError::invalid("storage.partition_key", "must not be empty"));
        }
        if self.sort_key.as_deref() == Some(self.partition_key.as_str()) {
            return Err(ConfigError::invalid(
                "storage.sort_key",
                "must differ from the partition key",
            ));
        }
        Ok(())
    }
}
