//! Whole-store provisioning flows.
//!
//! - seed: create a principal for every seed entry, only into an empty pool.
//! - backfill: write a profile for every listed principal, only into an
//!   empty profile table.
//! - purge: delete every principal.
//!
//! Seed entries are profile-shaped objects carrying at least `email`. The
//! same entries are matched back to principals by e-mail during backfill.
//! Seeded principals are created without an invitation message.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::batch::{BatchOutcome, BatchWriter};
use crate::config::{BatchConfig, ConfigError, IdentityConfig, StorageConfig};
use crate::identity::{IdentityError, IdentityStore, Principal, PrincipalId, PrincipalSpec};
use crate::profile::ProfileDraft;
use crate::storage::{DocumentStore, Item, StoreError};

/// Seed entry field holding the login e-mail.
const EMAIL_FIELD: &str = "email";
/// Seed entry field holding the phone number.
const PHONE_FIELD: &str = "phoneNumber";

/// Errors that stop a bulk flow before it starts writing.
#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    #[error("Identity store error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),
}

/// One principal the flow could not create or delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    /// Username or principal id.
    pub subject: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedOutcome {
    /// True when the pool already held principals and nothing was created.
    pub skipped: bool,
    pub created: usize,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeOutcome {
    pub deleted: usize,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillOutcome {
    /// True when the profile table already held items and nothing was written.
    pub skipped: bool,
    /// Principals whose e-mail matched a seed entry.
    pub matched: usize,
    pub batch: Option<BatchOutcome>,
}

impl SeedOutcome {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl PurgeOutcome {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl BackfillOutcome {
    pub fn success(&self) -> bool {
        self.batch.as_ref().map_or(true, |batch| batch.success)
    }
}

/// Runs the bulk flows against a pair of stores.
pub struct BulkProvisioner {
    identity: Arc<dyn IdentityStore>,
    documents: Arc<dyn DocumentStore>,
    writer: BatchWriter,
    storage: StorageConfig,
    concurrency: usize,
}

impl BulkProvisioner {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        documents: Arc<dyn DocumentStore>,
        storage: StorageConfig,
        identity_config: &IdentityConfig,
        batch: BatchConfig,
    ) -> Result<Self, ConfigError> {
        identity_config.validate_bulk()?;
        let writer = BatchWriter::new(documents.clone(), batch)?;
        Ok(Self {
            identity,
            documents,
            writer,
            storage,
            concurrency: identity_config.bulk_concurrency,
        })
    }

    /// Create a principal per seed entry unless the pool has any.
    pub async fn seed_principals(&self, entries: &[Item]) -> Result<SeedOutcome, BulkError> {
        let existing = self.identity.list_principals().await?;
        if !existing.is_empty() {
            info!(existing = existing.len(), "Principals already exist, skipping seed");
            return Ok(SeedOutcome {
                skipped: true,
                created: 0,
                failures: Vec::new(),
            });
        }

        let mut failures = Vec::new();
        let mut specs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match seed_spec(entry) {
                Some(spec) => specs.push(spec),
                None => failures.push(BulkFailure {
                    subject: format!("entry {}", index),
                    reason: format!("missing string field '{}'", EMAIL_FIELD),
                }),
            }
        }

        let results: Vec<(String, Result<PrincipalId, IdentityError>)> = stream::iter(specs)
            .map(|spec| async move {
                let result = self.identity.create_principal(&spec).await;
                (spec.username, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut created = 0;
        for (username, result) in results {
            match result {
                Ok(principal_id) => {
                    debug!(username = %username, principal_id = %principal_id, "Seeded principal");
                    created += 1;
                }
                Err(e) => {
                    warn!(username = %username, error = %e, "Seeding principal failed");
                    failures.push(BulkFailure {
                        subject: username,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(created, failed = failures.len(), "Seed complete");

        Ok(SeedOutcome {
            skipped: false,
            created,
            failures,
        })
    }

    /// Write a profile for every principal unless the profile table has any
    /// items. Profile fields come from the seed entry with the principal's
    /// e-mail, when there is one.
    pub async fn backfill_profiles(&self, seed: &[Item]) -> Result<BackfillOutcome, BulkError> {
        let table = &self.storage.profile_table;

        let existing = self.documents.scan(table).await?;
        if !existing.is_empty() {
            info!(table = %table, existing = existing.len(), "Profiles already exist, skipping backfill");
            return Ok(BackfillOutcome {
                skipped: true,
                matched: 0,
                batch: None,
            });
        }

        let principals = self.identity.list_principals().await?;
        let mut matched = 0;
        let items: Vec<Item> = principals
            .iter()
            .map(|principal| {
                let entry = seed_entry_for(seed, principal);
                if entry.is_some() {
                    matched += 1;
                }
                profile_item(principal, entry, &self.storage)
            })
            .collect();

        info!(
            table = %table,
            principals = principals.len(),
            matched,
            "Backfilling profiles"
        );

        let batch = self.writer.batch_put(table, items).await?;

        Ok(BackfillOutcome {
            skipped: false,
            matched,
            batch: Some(batch),
        })
    }

    /// Delete every principal. A principal already gone counts as deleted.
    pub async fn purge_principals(&self) -> Result<PurgeOutcome, BulkError> {
        let principals = self.identity.list_principals().await?;
        info!(count = principals.len(), "Purging principals");

        let results: Vec<(PrincipalId, Result<(), IdentityError>)> = stream::iter(principals)
            .map(|principal| async move {
                let result = self.identity.delete_principal(&principal.principal_id).await;
                (principal.principal_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut deleted = 0;
        let mut failures = Vec::new();
        for (principal_id, result) in results {
            match result {
                Ok(()) | Err(IdentityError::NotFound { .. }) => deleted += 1,
                Err(e) => {
                    warn!(principal_id = %principal_id, error = %e, "Deleting principal failed");
                    failures.push(BulkFailure {
                        subject: principal_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(deleted, failed = failures.len(), "Purge complete");

        Ok(PurgeOutcome { deleted, failures })
    }
}

fn string_field<'a>(entry: &'a Item, field: &str) -> Option<&'a str> {
    entry.get(field).and_then(Value::as_str)
}

/// Principal spec for a seed entry: the e-mail is the username.
fn seed_spec(entry: &Item) -> Option<PrincipalSpec> {
    let email = string_field(entry, EMAIL_FIELD)?;
    let mut spec = PrincipalSpec::new(email)
        .with_attribute("email", email)
        .with_suppressed_invitation();
    if let Some(phone_number) = string_field(entry, PHONE_FIELD) {
        spec = spec.with_attribute("phone_number", phone_number);
    }
    Some(spec)
}

fn seed_entry_for<'a>(seed: &'a [Item], principal: &Principal) -> Option<&'a Item> {
    let email = principal.attribute("email")?;
    seed.iter()
        .find(|entry| string_field(entry, EMAIL_FIELD) == Some(email))
}

fn profile_item(principal: &Principal, entry: Option<&Item>, storage: &StorageConfig) -> Item {
    let username = principal
        .attribute("email")
        .unwrap_or_else(|| principal.principal_id.as_str());
    let mut draft = ProfileDraft::new(username);
    if let Some(entry) = entry {
        for (name, value) in entry {
            draft = draft.with_attribute(name.clone(), value.clone());
        }
    }
    draft.build(&principal.principal_id).to_item(storage)
}
