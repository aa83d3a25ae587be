//! Write-through claim handle used by a single run

use std::sync::Arc;

use tracing::debug;

use crate::claim::{Claim, SubmissionStatus};
use crate::ledger::{LedgerError, Stage};
use crate::ports::ClaimRepository;
use super::WorkflowError;

/// Owns the run's copy of the claim and saves every change
///
/// Saves carry the claim's version stamp. When another writer got there
/// first the save fails with [`WorkflowError::Superseded`] and the run must
/// stop without writing again.
pub struct ClaimTracker {
    repository: Arc<dyn ClaimRepository>,
    claim: Claim,
}

impl ClaimTracker {
    pub fn new(repository: Arc<dyn ClaimRepository>, claim: Claim) -> Self {
        Self { repository, claim }
    }

    /// Latest persisted view of the claim
    pub fn claim(&self) -> &Claim {
        &self.claim
    }

    pub fn into_claim(self) -> Claim {
        self.claim
    }

    /// Applies a change and persists it
    pub async fn update<F>(&mut self, change: F) -> Result<(), WorkflowError>
    where
        F: FnOnce(&mut Claim) -> Result<(), LedgerError> + Send,
    {
        change(&mut self.claim)?;
        let saved = self.repository.save(&self.claim).await?;
        debug!(
            claim_id = %saved.id,
            version = saved.version,
            status = %saved.status(),
            "Claim persisted"
        );
        self.claim = saved;
        Ok(())
    }

    pub async fn start(&mut self, stage: Stage, message: impl Into<String> + Send) -> Result<(), WorkflowError> {
        self.update(|claim| claim.start_stage(stage, message)).await
    }

    pub async fn complete(
        &mut self,
        stage: Stage,
        message: impl Into<String> + Send,
        data: Option<serde_json::Value>,
    ) -> Result<(), WorkflowError> {
        self.update(|claim| claim.complete_stage(stage, message, data)).await
    }

    /// Completes the final stage and records the gateway outcome in one write
    pub async fn finish(
        &mut self,
        message: impl Into<String> + Send,
        data: Option<serde_json::Value>,
        outcome: SubmissionStatus,
        response: serde_json::Value,
    ) -> Result<(), WorkflowError> {
        self.update(|claim| {
            claim.complete_stage(Stage::NphiesSubmission, message, data)?;
            claim.record_outcome(outcome, response);
            Ok(())
        })
        .await
    }
}
