//! In-memory identity store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{IdentityError, IdentityStore, Principal, PrincipalId, PrincipalSpec, Result};

/// Mock identity store that assigns random principal ids.
#[derive(Default)]
pub struct MemoryIdentityStore {
    principals: RwLock<HashMap<PrincipalId, PrincipalSpec>>,
    fail_on_create: RwLock<bool>,
    fail_on_delete: RwLock<bool>,
    fail_on_list: RwLock<bool>,
    delete_calls: RwLock<Vec<PrincipalId>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }

    pub async fn set_fail_on_delete(&self, fail: bool) {
        *self.fail_on_delete.write().await = fail;
    }

    pub async fn set_fail_on_list(&self, fail: bool) {
        *self.fail_on_list.write().await = fail;
    }

    /// Register a principal directly, bypassing `create_principal`.
    pub async fn insert(&self, principal_id: PrincipalId, spec: PrincipalSpec) {
        self.principals.write().await.insert(principal_id, spec);
    }

    pub async fn contains(&self, principal_id: &PrincipalId) -> bool {
        self.principals.read().await.contains_key(principal_id)
    }

    /// The spec a principal was created from.
    pub async fn spec_of(&self, principal_id: &PrincipalId) -> Option<PrincipalSpec> {
        self.principals.read().await.get(principal_id).cloned()
    }

    pub async fn principal_count(&self) -> usize {
        self.principals.read().await.len()
    }

    /// Every principal id passed to `delete_principal`, including failed calls.
    pub async fn delete_calls(&self) -> Vec<PrincipalId> {
        self.delete_calls.read().await.clone()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_principal(&self, spec: &PrincipalSpec) -> Result<PrincipalId> {
        if *self.fail_on_create.read().await {
            return Err(IdentityError::Unknown {
                operation: "CreatePrincipal",
                message: "injected failure".to_string(),
            });
        }

        let mut principals = self.principals.write().await;
        if principals.values().any(|p| p.username == spec.username) {
            return Err(IdentityError::AlreadyExists {
                username: spec.username.clone(),
            });
        }

        let principal_id = PrincipalId::new(Uuid::new_v4().to_string());
        principals.insert(principal_id.clone(), spec.clone());
        Ok(principal_id)
    }

    async fn delete_principal(&self, principal_id: &PrincipalId) -> Result<()> {
        self.delete_calls.write().await.push(principal_id.clone());

        if *self.fail_on_delete.read().await {
            return Err(IdentityError::Unknown {
                operation: "DeletePrincipal",
                message: "injected failure".to_string(),
            });
        }

        match self.principals.write().await.remove(principal_id) {
            Some(_) => Ok(()),
            None => Err(IdentityError::NotFound {
                principal_id: principal_id.clone(),
            }),
        }
    }

    async fn list_principals(&self) -> Result<Vec<Principal>> {
        if *self.fail_on_list.read().await {
            return Err(IdentityError::Unknown {
                operation: "ListPrincipals",
                message: "injected failure".to_string(),
            });
        }

        let mut principals: Vec<Principal> = self
            .principals
            .read()
            .await
            .iter()
            .map(|(principal_id, spec)| Principal {
                principal_id: principal_id.clone(),
                attributes: spec.attributes.clone(),
            })
            .collect();
        principals.sort_by(|a, b| a.principal_id.cmp(&b.principal_id));
        Ok(principals)
    }
}
