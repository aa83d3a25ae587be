//! Manual retry of failed or rejected claims

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use core_kernel::ClaimId;
use crate::claim::{Claim, ClaimStatus};
use crate::error::ClaimError;
use crate::ports::ClaimRepository;
use crate::workflow::{WorkflowCoordinator, WorkflowError};

/// A retry that was accepted and rescheduled
#[derive(Debug)]
pub struct RetryAccepted {
    /// Claim as persisted after the reset, status `received`
    pub claim: Claim,
    /// The new run
    pub task: JoinHandle<Result<Claim, WorkflowError>>,
}

/// Resets eligible claims and runs them again
#[derive(Clone)]
pub struct RetryController {
    repository: Arc<dyn ClaimRepository>,
    coordinator: Arc<WorkflowCoordinator>,
    allow_rejected_retry: bool,
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("coordinator", &self.coordinator)
            .field("allow_rejected_retry", &self.allow_rejected_retry)
            .finish_non_exhaustive()
    }
}

impl RetryController {
    pub fn new(
        repository: Arc<dyn ClaimRepository>,
        coordinator: Arc<WorkflowCoordinator>,
        allow_rejected_retry: bool,
    ) -> Self {
        Self {
            repository,
            coordinator,
            allow_rejected_retry,
        }
    }

    /// Checks whether a claim in `status` may be retried
    pub fn check_retryable(&self, id: &ClaimId, status: ClaimStatus) -> Result<(), ClaimError> {
        match status {
            ClaimStatus::Error => Ok(()),
            ClaimStatus::Rejected if self.allow_rejected_retry => Ok(()),
            ClaimStatus::Rejected | ClaimStatus::Submitted | ClaimStatus::Accepted => {
                Err(ClaimError::NotRetryable { id: id.clone(), status })
            }
            in_flight => Err(ClaimError::AlreadyInProgress {
                id: id.clone(),
                status: in_flight,
            }),
        }
    }

    /// Resets the claim to `received` and starts a new run
    ///
    /// The reset is a version-checked save. If another writer changed the
    /// claim in between, the retry is refused as already in progress.
    pub async fn retry(&self, id: &ClaimId) -> Result<RetryAccepted, ClaimError> {
        let mut claim = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| ClaimError::NotFound(id.clone()))?;

        self.check_retryable(id, claim.status())?;
        let previous = claim.status();
        claim.reset_for_retry();

        let saved = match self.repository.save(&claim).await {
            Ok(saved) => saved,
            Err(err) if err.is_conflict() => {
                let current = self
                    .repository
                    .get(id)
                    .await?
                    .map(|c| c.status())
                    .unwrap_or(ClaimStatus::Received);
                warn!(claim_id = %id, status = %current, "Retry lost a concurrent update");
                return Err(ClaimError::AlreadyInProgress {
                    id: id.clone(),
                    status: current,
                });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            claim_id = %id,
            previous = %previous,
            retry_count = saved.retry_count,
            "Claim reset for retry"
        );

        let task = self.coordinator.spawn(saved.clone());
        Ok(RetryAccepted { claim: saved, task })
    }
}
