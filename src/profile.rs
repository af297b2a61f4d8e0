//! Profile records.
//!
//! A profile is the application-owned document paired with an identity
//! principal. It is keyed by the principal id the identity store assigned,
//! never by the login handle.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;

use crate::config::StorageConfig;
use crate::identity::PrincipalId;
use crate::storage::{Item, Key, Result, StoreError};

/// Addresses the profile of one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileKey {
    pub principal_id: PrincipalId,
}

impl ProfileKey {
    pub fn new(principal_id: impl Into<PrincipalId>) -> Self {
        Self {
            principal_id: principal_id.into(),
        }
    }

    /// Document store key under the configured key schema.
    pub fn to_key(&self, config: &StorageConfig) -> Key {
        let key = Key::new(
            config.partition_key.clone(),
            self.principal_id.as_str().to_string(),
        );
        match &config.sort_key {
            Some(sort_key) => key.with(sort_key.clone(), config.sort_value.clone()),
            None => key,
        }
    }
}

/// Fractional-second digits kept in the stored timestamp.
const CREATED_AT_DIGITS: u16 = 3;

/// A persisted profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub principal_id: PrincipalId,
    pub username: String,
    pub created_at: DateTime<Utc>,
    /// User-supplied fields (name, address, phone, ...).
    pub attributes: Item,
}

impl ProfileRecord {
    /// Drop timestamp precision the stored item cannot hold, so the record
    /// equals what `from_item` reads back.
    pub fn at_stored_precision(mut self) -> Self {
        self.created_at = self.created_at.trunc_subsecs(CREATED_AT_DIGITS);
        self
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(self.principal_id.clone())
    }

    /// Flatten into a store item. Key and system fields win over user
    /// attributes of the same name.
    pub fn to_item(&self, config: &StorageConfig) -> Item {
        let mut item = self.attributes.clone();
        item.insert(
            config.username_attribute.clone(),
            Value::String(self.username.clone()),
        );
        item.insert(
            config.created_at_attribute.clone(),
            Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        item.extend(self.key().to_key(config).into_attributes());
        item
    }

    /// Rebuild a record from a stored item.
    pub fn from_item(mut item: Item, config: &StorageConfig) -> Result<Self> {
        let principal_id = take_string(&mut item, &config.partition_key)?;
        if let Some(sort_key) = &config.sort_key {
            item.remove(sort_key);
        }
        let username = take_string(&mut item, &config.username_attribute)?;
        let created_at = take_string(&mut item, &config.created_at_attribute)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| {
                StoreError::Serialization(format!(
                    "invalid {}: {}",
                    config.created_at_attribute, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            principal_id: PrincipalId::new(principal_id),
            username,
            created_at,
            attributes: item,
        })
    }
}

fn take_string(item: &mut Item, attribute: &str) -> Result<String> {
    match item.remove(attribute) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(StoreError::Serialization(format!(
            "attribute '{}' is not a string: {}",
            attribute, other
        ))),
        None => Err(StoreError::MissingKeyAttribute {
            attribute: attribute.to_string(),
        }),
    }
}

/// A profile waiting for its principal id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDraft {
    pub username: String,
    pub attributes: Item,
}

impl ProfileDraft {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            attributes: Item::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Stamp the draft with its principal id and creation time.
    pub fn build(self, principal_id: &PrincipalId) -> ProfileRecord {
        ProfileRecord {
            principal_id: principal_id.clone(),
            username: self.username,
            created_at: Utc::now().trunc_subsecs(CREATED_AT_DIGITS),
            attributes: self.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    use super::*;

    fn record() -> ProfileRecord {
        ProfileDraft::new("ada@example.com")
            .with_attribute("firstName", "Ada")
            .with_attribute("address", json!({"city": "London"}))
            .build(&PrincipalId::from("sub-1"))
    }

    #[test]
    fn test_key_uses_principal_id_and_details_marker() {
        let key = ProfileKey::new("sub-1").to_key(&StorageConfig::default());
        assert_eq!(key, Key::new("userId", "sub-1").with("dataKey", "details"));
    }

    #[test]
    fn test_key_without_sort_key() {
        let config = StorageConfig {
            sort_key: None,
            ..StorageConfig::default()
        };
        let key = ProfileKey::new("sub-1").to_key(&config);
        assert_eq!(key, Key::new("userId", "sub-1"));
    }

    #[test]
    fn test_item_round_trip() {
        let config = StorageConfig::default();
        let mut original = record();
        original.created_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        let item = original.to_item(&config);
        assert_eq!(item.get("userId"), Some(&json!("sub-1")));
        assert_eq!(item.get("dataKey"), Some(&json!("details")));
        assert_eq!(item.get("userName"), Some(&json!("ada@example.com")));
        assert_eq!(item.get("createdAt"), Some(&json!("2024-03-01T12:30:00.000Z")));

        let restored = ProfileRecord::from_item(item, &config).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_built_record_survives_store_round_trip() {
        let config = StorageConfig::default();
        let built = record();

        let restored = ProfileRecord::from_item(built.to_item(&config), &config).unwrap();
        assert_eq!(restored, built);
    }

    #[test]
    fn test_at_stored_precision_truncates_to_millis() {
        let mut record = record();
        record.created_at = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .unwrap()
            .with_nanosecond(192_371_993)
            .unwrap();

        let record = record.at_stored_precision();
        assert_eq!(record.created_at.nanosecond(), 192_000_000);
    }

    #[test]
    fn test_system_fields_override_user_attributes() {
        let config = StorageConfig::default();
        let record = ProfileDraft::new("ada")
            .with_attribute("userId", "forged")
            .with_attribute("userName", "mallory")
            .build(&PrincipalId::from("sub-1"));

        let item = record.to_item(&config);
        assert_eq!(item.get("userId"), Some(&json!("sub-1")));
        assert_eq!(item.get("userName"), Some(&json!("ada")));
    }

    #[test]
    fn test_from_item_missing_username() {
        let config = StorageConfig::default();
        let mut item = record().to_item(&config);
        item.remove("userName");

        assert!(matches!(
            ProfileRecord::from_item(item, &config),
            Err(StoreError::MissingKeyAttribute { .. })
        ));
    }
}
