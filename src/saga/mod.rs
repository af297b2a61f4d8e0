//! Profile sagas.
//!
//! Keeps an identity principal and its profile record in step across two
//! stores that share no transaction. Each saga runs its forward steps in
//! order and, when the second step fails, undoes the first with its direct
//! inverse:
//!
//! - create: create principal, write profile; on write failure delete the
//!   principal.
//! - delete: delete profile, delete principal; on principal failure put the
//!   removed profile back.
//!
//! A caller that abandons a saga future between its steps skips the
//! compensation. Such a principal is left without a profile.

mod error;

pub use error::{SagaError, SagaKind, StepError};

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::identity::{IdentityError, IdentityStore, PrincipalId, PrincipalSpec};
use crate::profile::{ProfileKey, ProfileRecord};
use crate::storage::{DocumentStore, Item};

/// Runs the create and delete sagas against a pair of stores.
pub struct ProfileSaga {
    identity: Arc<dyn IdentityStore>,
    documents: Arc<dyn DocumentStore>,
    config: StorageConfig,
}

impl ProfileSaga {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        documents: Arc<dyn DocumentStore>,
        config: StorageConfig,
    ) -> Self {
        Self {
            identity,
            documents,
            config,
        }
    }

    /// Provision a principal and write its profile, or neither.
    ///
    /// `build_profile` receives the principal id assigned by the identity
    /// store. The returned record is keyed by that id whatever the builder
    /// put in `principal_id`.
    pub async fn create_with_compensation<F>(
        &self,
        spec: &PrincipalSpec,
        build_profile: F,
    ) -> Result<ProfileRecord, SagaError>
    where
        F: FnOnce(&PrincipalId) -> ProfileRecord + Send,
    {
        let principal_id = self
            .identity
            .create_principal(spec)
            .await
            .map_err(|e| {
                warn!(username = %spec.username, error = %e, "Principal creation failed");
                SagaError::IdentityCreate(e)
            })?;

        debug!(
            username = %spec.username,
            principal_id = %principal_id,
            "Principal created"
        );

        let mut record = build_profile(&principal_id).at_stored_precision();
        record.principal_id = principal_id.clone();

        let write = self
            .documents
            .put_item(&self.config.profile_table, record.to_item(&self.config))
            .await;

        let write_error = match write {
            Ok(_) => {
                info!(principal_id = %principal_id, "Profile created");
                return Ok(record);
            }
            Err(e) => e,
        };

        warn!(
            principal_id = %principal_id,
            error = %write_error,
            "Profile write failed, deleting principal"
        );

        match self.identity.delete_principal(&principal_id).await {
            Ok(()) => Err(SagaError::ProfileWrite {
                principal_id,
                source: write_error,
            }),
            Err(IdentityError::NotFound { .. }) => {
                warn!(
                    principal_id = %principal_id,
                    "Principal already gone during compensation"
                );
                Err(SagaError::ProfileWrite {
                    principal_id,
                    source: write_error,
                })
            }
            Err(compensation_error) => {
                error!(
                    principal_id = %principal_id,
                    error = %write_error,
                    compensation_error = %compensation_error,
                    "Principal left without profile: compensating delete failed"
                );
                Err(SagaError::CompensationFailed {
                    saga: SagaKind::Create,
                    principal_id,
                    step_error: write_error.into(),
                    compensation_error: compensation_error.into(),
                })
            }
        }
    }

    /// Delete a profile and its principal, or neither.
    ///
    /// Returns the removed profile item.
    pub async fn delete_with_restore(&self, key: &ProfileKey) -> Result<Item, SagaError> {
        let table = &self.config.profile_table;
        let store_key = key.to_key(&self.config);
        let principal_id = &key.principal_id;

        let existing = self
            .documents
            .get_item(table, &store_key)
            .await
            .map_err(SagaError::ProfileLookup)?;
        if existing.is_none() {
            debug!(principal_id = %principal_id, "No profile to delete");
            return Err(SagaError::NotFound {
                principal_id: principal_id.clone(),
            });
        }

        let original = self
            .documents
            .delete_item(table, &store_key)
            .await
            .map_err(SagaError::ProfileDelete)?
            .ok_or_else(|| SagaError::NotFound {
                principal_id: principal_id.clone(),
            })?;

        debug!(principal_id = %principal_id, "Profile deleted");

        let delete_error = match self.identity.delete_principal(principal_id).await {
            Ok(()) => {
                info!(principal_id = %principal_id, "Profile and principal deleted");
                return Ok(original);
            }
            Err(IdentityError::NotFound { .. }) => {
                warn!(
                    principal_id = %principal_id,
                    "Principal already gone, profile deletion stands"
                );
                return Ok(original);
            }
            Err(e) => e,
        };

        warn!(
            principal_id = %principal_id,
            error = %delete_error,
            "Principal delete failed, restoring profile"
        );

        match self.documents.put_item(table, original).await {
            Ok(_) => Err(SagaError::IdentityDelete {
                principal_id: principal_id.clone(),
                source: delete_error,
            }),
            Err(restore_error) => {
                error!(
                    principal_id = %principal_id,
                    error = %delete_error,
                    compensation_error = %restore_error,
                    "Principal left without profile: restore failed"
                );
                Err(SagaError::CompensationFailed {
                    saga: SagaKind::Delete,
                    principal_id: principal_id.clone(),
                    step_error: delete_error.into(),
                    compensation_error: restore_error.into(),
                })
            }
        }
    }
}
