//! Claim intake
//!
//! Validates a submission, persists the initial record and schedules the
//! first run. Nothing here waits on a remote collaborator.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use core_kernel::ClaimId;
use crate::claim::Claim;
use crate::error::{ClaimError, StoreError};
use crate::ports::ClaimRepository;
use crate::validation::{ClaimSubmission, SubmissionValidator};
use crate::workflow::{WorkflowCoordinator, WorkflowError};

/// Attempts at finding an unused claim id
pub const MAX_ID_ATTEMPTS: usize = 3;

/// A persisted submission and its scheduled run
#[derive(Debug)]
pub struct Submitted {
    pub claim: Claim,
    pub task: JoinHandle<Result<Claim, WorkflowError>>,
}

/// Entry point for new claims
#[derive(Clone)]
pub struct ClaimIntake {
    validator: SubmissionValidator,
    repository: Arc<dyn ClaimRepository>,
    coordinator: Arc<WorkflowCoordinator>,
}

impl std::fmt::Debug for ClaimIntake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimIntake")
            .field("validator", &self.validator)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ClaimIntake {
    pub fn new(
        validator: SubmissionValidator,
        repository: Arc<dyn ClaimRepository>,
        coordinator: Arc<WorkflowCoordinator>,
    ) -> Self {
        Self {
            validator,
            repository,
            coordinator,
        }
    }

    /// Validates, persists and schedules a submission
    ///
    /// # Errors
    ///
    /// - `ClaimError::Validation` with one message per violated field; nothing is stored
    /// - `ClaimError::Store` when the record cannot be persisted
    pub async fn submit(&self, submission: &ClaimSubmission) -> Result<Submitted, ClaimError> {
        let validated = self
            .validator
            .validate(submission)
            .map_err(ClaimError::Validation)?;

        let mut last_error = None;
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let claim = Claim::receive(
                ClaimId::generate(),
                validated.patient.clone(),
                validated.claim_type,
                validated.metadata.clone(),
                validated.attachment.clone(),
            );

            match self.repository.insert(claim).await {
                Ok(stored) => {
                    info!(
                        claim_id = %stored.id,
                        claim_type = stored.claim_type.as_str(),
                        "Claim received"
                    );
                    let task = self.coordinator.spawn(stored.clone());
                    return Ok(Submitted { claim: stored, task });
                }
                Err(StoreError::Duplicate(id)) => {
                    warn!(claim_id = %id, attempt, "Claim id collision, regenerating");
                    last_error = Some(StoreError::Duplicate(id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ClaimError::Store(last_error.unwrap_or_else(|| {
            StoreError::backend("no claim id could be allocated")
        })))
    }
}
