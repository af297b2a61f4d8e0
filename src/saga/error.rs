//! Saga error taxonomy.

use std::fmt;

use crate::identity::{IdentityError, PrincipalId};
use crate::storage::StoreError;

/// Which saga raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaKind {
    Create,
    Delete,
}

impl fmt::Display for SagaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaKind::Create => f.write_str("create-with-compensation"),
            SagaKind::Delete => f.write_str("delete-with-restore"),
        }
    }
}

/// Failure of a single forward or compensating step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by [`ProfileSaga`](super::ProfileSaga).
///
/// Each variant names the step that failed. Variants other than
/// `CompensationFailed` leave the principal and its profile consistent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SagaError {
    /// Identity store refused the principal. Nothing was written.
    #[error("Failed to create principal: {0}")]
    IdentityCreate(#[source] IdentityError),

    /// Profile write failed; the principal was deleted again.
    #[error("Failed to write profile for {principal_id}: {source}")]
    ProfileWrite {
        principal_id: PrincipalId,
        #[source]
        source: StoreError,
    },

    /// No profile exists for the principal. Nothing was changed.
    #[error("Profile not found: {principal_id}")]
    NotFound { principal_id: PrincipalId },

    #[error("Failed to look up profile: {0}")]
    ProfileLookup(#[source] StoreError),

    /// Profile delete failed. Nothing was changed.
    #[error("Failed to delete profile: {0}")]
    ProfileDelete(#[source] StoreError),

    /// Principal delete failed; the profile was restored.
    #[error("Failed to delete principal {principal_id}: {source}")]
    IdentityDelete {
        principal_id: PrincipalId,
        #[source]
        source: IdentityError,
    },

    /// The compensating action failed too. One half of the pair is left
    /// behind and needs an operator.
    #[error(
        "{saga} for {principal_id} left inconsistent state: step failed ({step_error}), \
         compensation failed ({compensation_error})"
    )]
    CompensationFailed {
        saga: SagaKind,
        principal_id: PrincipalId,
        step_error: StepError,
        compensation_error: StepError,
    },
}

impl SagaError {
    /// HTTP-style status a request handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            SagaError::IdentityCreate(IdentityError::AlreadyExists { .. }) => 409,
            SagaError::NotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Machine-readable reason matching `status_code`.
    pub fn reason(&self) -> &'static str {
        match self.status_code() {
            409 => "ResourceExists",
            404 => "NotFound",
            _ => "Unknown",
        }
    }

    pub fn is_compensation_failure(&self) -> bool {
        matches!(self, SagaError::CompensationFailed { .. })
    }

    /// Principal the failure concerns, when one was known.
    pub fn principal_id(&self) -> Option<&PrincipalId> {
        match self {
            SagaError::ProfileWrite { principal_id, .. }
            | SagaError::NotFound { principal_id }
            | SagaError::IdentityDelete { principal_id, .. }
            | SagaError::CompensationFailed { principal_id, .. } => Some(principal_id),
            SagaError::IdentityCreate(_)
            | SagaError::ProfileLookup(_)
            | SagaError::ProfileDelete(_) => None,
        }
    }
}
