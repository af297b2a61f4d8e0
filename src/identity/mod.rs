//! Identity store contract.
//!
//! The identity store owns authentication principals. The core creates and
//! deletes principals through [`IdentityStore`] and never mutates them
//! otherwise.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

#[cfg(feature = "aws")]
pub mod cognito;

pub use memory::MemoryIdentityStore;

#[cfg(feature = "aws")]
pub use cognito::CognitoIdentityStore;

/// Result type for identity store operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors from identity store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("A principal already exists with username: {username}")]
    AlreadyExists { username: String },

    #[error("Principal not found: {principal_id}")]
    NotFound { principal_id: PrincipalId },

    #[error("{operation} failed: {message}")]
    Unknown {
        operation: &'static str,
        message: String,
    },
}

impl IdentityError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, IdentityError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IdentityError::NotFound { .. })
    }
}

/// Identifier the identity store assigns to a principal.
///
/// Distinct from the login handle the caller chose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Channel used to deliver the initial credentials of a new principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryMedium {
    Email,
    Sms,
}

/// What is needed to provision one principal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalSpec {
    /// Login handle (username or e-mail).
    pub username: String,
    /// Identity-store attributes, e.g. `email`, `phone_number`.
    pub attributes: BTreeMap<String, String>,
    pub delivery_mediums: Vec<DeliveryMedium>,
    /// Create the principal without sending an invitation message.
    pub suppress_invitation: bool,
}

impl PrincipalSpec {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_delivery_mediums(mut self, mediums: Vec<DeliveryMedium>) -> Self {
        self.delivery_mediums = mediums;
        self
    }

    pub fn with_suppressed_invitation(mut self) -> Self {
        self.suppress_invitation = true;
        self
    }
}

/// A principal as the identity store lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub attributes: BTreeMap<String, String>,
}

impl Principal {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Interface for the identity store.
///
/// # Implementations
///
/// - `CognitoIdentityStore`: Cognito user pool (feature `aws`)
/// - `MemoryIdentityStore`: in-memory store with failure injection
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Provision a principal, returning the identifier the store assigned.
    ///
    /// Fails with [`IdentityError::AlreadyExists`] if the username is taken.
    async fn create_principal(&self, spec: &PrincipalSpec) -> Result<PrincipalId>;

    /// Remove a principal by its assigned identifier.
    async fn delete_principal(&self, principal_id: &PrincipalId) -> Result<()>;

    /// Every principal in the store, following pagination to the end.
    async fn list_principals(&self) -> Result<Vec<Principal>>;
}
