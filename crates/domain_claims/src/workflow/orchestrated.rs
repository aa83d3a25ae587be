//! Orchestrated execution path
//!
//! The external workflow engine performs normalization, pricing, signing and
//! submission on its own. While it runs the ledger shows `normalization` in
//! progress; on success the four remaining stages complete together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::claim::{Claim, ExecutionPathKind, SubmissionStatus};
use crate::ledger::Stage;
use crate::ports::{OrchestrationRequest, OrchestratorPort};
use super::{within_deadline, ClaimTracker, ExecutionStrategy, RunContext, WorkflowError};

const DISPATCHED: &str = "Dispatched to workflow orchestrator";
const COMPLETED: &str = "Completed by workflow orchestrator";

/// Delegates the claim to the external orchestrator
pub struct OrchestratedPath {
    orchestrator: Arc<dyn OrchestratorPort>,
    default_facility_id: String,
    timeout: Duration,
}

impl OrchestratedPath {
    pub fn new(orchestrator: Arc<dyn OrchestratorPort>, default_facility_id: String, timeout: Duration) -> Self {
        Self {
            orchestrator,
            default_facility_id,
            timeout,
        }
    }

    fn request(&self, claim: &Claim) -> OrchestrationRequest {
        let metadata = &claim.metadata;
        OrchestrationRequest {
            claim_id: claim.id.clone(),
            patient_name: claim.patient.name.clone(),
            patient_id: claim.patient.id.clone(),
            claim_type: claim.claim_type,
            user_email: metadata.user_email.clone(),
            member_id: metadata.member_id.clone(),
            payer_id: metadata.payer_id.clone(),
            provider_id: metadata.provider_id.clone(),
            facility_id: metadata
                .facility_id
                .clone()
                .unwrap_or_else(|| self.default_facility_id.clone()),
            service_code: metadata.service_code.clone(),
            service_description: metadata.service_description.clone(),
            attachment: claim.attachment.clone(),
            submitted_at: metadata.submitted_at,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for OrchestratedPath {
    fn kind(&self) -> ExecutionPathKind {
        ExecutionPathKind::Orchestrator
    }

    async fn execute(&self, tracker: &mut ClaimTracker, ctx: &RunContext) -> Result<(), WorkflowError> {
        tracker.start(Stage::Normalization, DISPATCHED).await?;

        let request = self.request(tracker.claim());
        let call = ctx.call(self.timeout);
        let receipt = within_deadline(
            "start_workflow",
            self.timeout,
            &ctx.cancel,
            self.orchestrator.start_workflow(&request, &call),
        )
        .await
        .map_err(|e| WorkflowError::transport(Stage::Normalization, e))?;

        let outcome = SubmissionStatus::from_orchestrator(&receipt.status);
        let response = serde_json::to_value(&receipt).unwrap_or_default();

        tracker
            .update(|claim| {
                for stage in [
                    Stage::Normalization,
                    Stage::FinancialRules,
                    Stage::Signing,
                    Stage::NphiesSubmission,
                ] {
                    claim.complete_stage(stage, COMPLETED, None)?;
                }
                claim.record_outcome(outcome, response);
                Ok(())
            })
            .await?;

        info!(
            submission_id = receipt.submission_id.as_deref().unwrap_or("-"),
            outcome = outcome.as_str(),
            "Orchestrator accepted claim"
        );
        Ok(())
    }
}
