//! Identity store configuration types.

use serde::Deserialize;

use super::ConfigError;
use crate::identity::DeliveryMedium;

/// Default number of concurrent principal calls in bulk flows.
pub const DEFAULT_BULK_CONCURRENCY: usize = 25;

/// Identity store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Cognito user pool id.
    pub user_pool_id: String,
    /// AWS region override.
    pub region: Option<String>,
    /// Endpoint override, e.g. a local Cognito emulator.
    pub endpoint_url: Option<String>,
    /// Channels for the invitation message of new principals.
    pub delivery_mediums: Vec<DeliveryMedium>,
    /// Principal creates or deletes in flight during bulk seeding and purging.
    pub bulk_concurrency: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_pool_id: String::new(),
            region: None,
            endpoint_url: None,
            delivery_mediums: vec![DeliveryMedium::Email],
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }
}

impl IdentityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_pool_id.trim().is_empty() {
            return Err(ConfigError::invalid(
                "identity.user_pool_id",
                "must be set",
            ));
        }
        self.validate_bulk()
    }

    /// Checks only the settings the bulk flows use.
    pub fn validate_bulk(&self) -> Result<(), ConfigError> {
        if self.bulk_concurrency == 0 {
            return Err(ConfigError::invalid(
                "identity.bulk_concurrency",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_config_default() {
        let config = IdentityConfig::default();
        assert!(config.user_pool_id.is_empty());
        assert_eq!(config.delivery_mediums, vec![DeliveryMedium::Email]);
        assert_eq!(config.bulk_concurrency, 25);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_bulk_concurrency_rejected() {
        let config = IdentityConfig {
            user_pool_id: "us-east-1_pool".to_string(),
            bulk_concurrency: 0,
            ..IdentityConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "identity.bulk_concurrency",
                ..
            })
        ));
    }
}
