//! Claims domain errors

use thiserror::Error;

use core_kernel::ClaimId;
use crate::claim::ClaimStatus;
use crate::ledger::LedgerError;

/// Errors reported by claim store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Claim not found: {0}")]
    NotFound(ClaimId),

    #[error("Claim already exists: {0}")]
    Duplicate(ClaimId),

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: ClaimId,
        expected: u64,
        actual: u64,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Errors that can occur in the claims domain
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Claim not found: {0}")]
    NotFound(ClaimId),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Claim {id} is {status} and cannot be retried")]
    NotRetryable { id: ClaimId, status: ClaimStatus },

    #[error("Claim {id} is still being processed ({status})")]
    AlreadyInProgress { id: ClaimId, status: ClaimStatus },

    #[error("Invalid ledger transition: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Claim store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ClaimError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ClaimError::NotFound(id),
            other => ClaimError::Store(other),
        }
    }
}
