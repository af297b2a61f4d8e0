//! Cross-store consistency of the profile sagas under injected failures.
//!
//! After every saga, either the principal and its profile both exist or
//! neither does, unless the saga reported a failed compensation.

use std::sync::Arc;

use registrar::config::StorageConfig;
use registrar::identity::{MemoryIdentityStore, PrincipalId, PrincipalSpec};
use registrar::profile::{ProfileDraft, ProfileKey, ProfileRecord};
use registrar::saga::{ProfileSaga, SagaError};
use registrar::storage::{DocumentStore, MemoryDocumentStore};

struct World {
    identity: Arc<MemoryIdentityStore>,
    documents: Arc<MemoryDocumentStore>,
    config: StorageConfig,
    saga: ProfileSaga,
}

impl World {
    fn new() -> Self {
        let config = StorageConfig::default();
        let identity = Arc::new(MemoryIdentityStore::new());
        let documents = Arc::new(
            MemoryDocumentStore::new()
                .with_table(config.profile_table.clone(), config.key_schema()),
        );
        let saga = ProfileSaga::new(identity.clone(), documents.clone(), config.clone());
        Self {
            identity,
            documents,
            config,
            saga,
        }
    }

    async fn has_principal(&self, principal_id: &PrincipalId) -> bool {
        self.identity.contains(principal_id).await
    }

    async fn has_profile(&self, principal_id: &PrincipalId) -> bool {
        self.documents
            .get_item(
                &self.config.profile_table,
                &ProfileKey::new(principal_id.clone()).to_key(&self.config),
            )
            .await
            .unwrap()
            .is_some()
    }

    async fn create(&self, username: &str) -> Result<ProfileRecord, SagaError> {
        let spec = PrincipalSpec::new(username).with_attribute("email", username);
        self.saga
            .create_with_compensation(&spec, |id| {
                ProfileDraft::new(username)
                    .with_attribute("firstName", "Grace")
                    .with_attribute("city", "Arlington")
                    .build(id)
            })
            .await
    }

    async fn reset_failures(&self) {
        self.identity.set_fail_on_create(false).await;
        self.identity.set_fail_on_delete(false).await;
        self.documents.set_fail_on_get(false).await;
        self.documents.set_fail_on_put(false).await;
        self.documents.set_fail_on_delete(false).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    None,
    IdentityCreate,
    IdentityDelete,
    ProfileGet,
    ProfilePut,
    ProfileDelete,
}

const FAULTS: [Fault; 6] = [
    Fault::None,
    Fault::IdentityCreate,
    Fault::IdentityDelete,
    Fault::ProfileGet,
    Fault::ProfilePut,
    Fault::ProfileDelete,
];

async fn inject(world: &World, faults: &[Fault]) {
    for fault in faults {
        match fault {
            Fault::None => {}
            Fault::IdentityCreate => world.identity.set_fail_on_create(true).await,
            Fault::IdentityDelete => world.identity.set_fail_on_delete(true).await,
            Fault::ProfileGet => world.documents.set_fail_on_get(true).await,
            Fault::ProfilePut => world.documents.set_fail_on_put(true).await,
            Fault::ProfileDelete => world.documents.set_fail_on_delete(true).await,
        }
    }
}

#[tokio::test]
async fn create_is_all_or_nothing_under_every_fault_pair() {
    for first in FAULTS {
        for second in FAULTS {
            let world = World::new();
            inject(&world, &[first, second]).await;

            let result = world.create("grace@example.com").await;
            world.reset_failures().await;

            match result {
                Ok(record) => {
                    assert!(world.has_principal(&record.principal_id).await);
                    assert!(world.has_profile(&record.principal_id).await);
                }
                Err(SagaError::CompensationFailed { principal_id, .. }) => {
                    // Only a failed profile write plus a failed rollback gets here.
                    assert!(world.has_principal(&principal_id).await);
                    assert!(!world.has_profile(&principal_id).await);
                }
                Err(e) => {
                    assert_eq!(
                        world.identity.principal_count().await,
                        0,
                        "{:?}/{:?}: {}",
                        first,
                        second,
                        e
                    );
                    assert_eq!(
                        world.documents.item_count(&world.config.profile_table).await,
                        0
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn delete_is_all_or_nothing_under_every_fault_pair() {
    for first in FAULTS {
        for second in FAULTS {
            let world = World::new();
            let record = world.create("grace@example.com").await.unwrap();
            let id = record.principal_id.clone();
            let before = world.documents.items(&world.config.profile_table).await;
            inject(&world, &[first, second]).await;

            let result = world.saga.delete_with_restore(&record.key()).await;
            world.reset_failures().await;

            match result {
                Ok(_) => {
                    assert!(!world.has_principal(&id).await);
                    assert!(!world.has_profile(&id).await);
                }
                Err(SagaError::CompensationFailed { .. }) => {
                    assert!(world.has_principal(&id).await);
                    assert!(!world.has_profile(&id).await);
                }
                Err(e) => {
                    assert!(world.has_principal(&id).await, "{:?}/{:?}: {}", first, second, e);
                    assert_eq!(
                        world.documents.items(&world.config.profile_table).await,
                        before
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn compensating_delete_uses_returned_principal_id() {
    let world = World::new();
    world.documents.set_fail_on_put(true).await;

    let err = world.create("grace@example.com").await.unwrap_err();

    let SagaError::ProfileWrite { principal_id, .. } = &err else {
        panic!("expected ProfileWrite, got {:?}", err);
    };
    assert_ne!(principal_id.as_str(), "grace@example.com");
    assert_eq!(world.identity.delete_calls().await, vec![principal_id.clone()]);
}

#[tokio::test]
async fn delete_missing_user_is_not_found_and_changes_nothing() {
    let world = World::new();

    let err = world
        .saga
        .delete_with_restore(&ProfileKey::new("missing-user"))
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::NotFound { .. }));
    assert_eq!(err.status_code(), 404);
    assert_eq!(world.documents.item_count(&world.config.profile_table).await, 0);
    assert!(world.identity.delete_calls().await.is_empty());
}

#[tokio::test]
async fn failed_identity_delete_restores_identical_profile() {
    let world = World::new();
    let record = world.create("grace@example.com").await.unwrap();
    let key = record.key().to_key(&world.config);
    let before = world
        .documents
        .get_item(&world.config.profile_table, &key)
        .await
        .unwrap()
        .unwrap();
    world.identity.set_fail_on_delete(true).await;

    let err = world.saga.delete_with_restore(&record.key()).await.unwrap_err();

    assert!(matches!(err, SagaError::IdentityDelete { .. }));
    let after = world
        .documents
        .get_item(&world.config.profile_table, &key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        serde_json::to_vec(&after).unwrap(),
        serde_json::to_vec(&before).unwrap()
    );
    assert!(world.has_principal(&record.principal_id).await);
}

#[tokio::test]
async fn failed_restore_is_reported_as_compensation_failure() {
    let world = World::new();
    let record = world.create("grace@example.com").await.unwrap();
    world.identity.set_fail_on_delete(true).await;
    world.documents.set_fail_on_put(true).await;

    let err = world.saga.delete_with_restore(&record.key()).await.unwrap_err();

    assert!(err.is_compensation_failure());
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains(record.principal_id.as_str()));
}
