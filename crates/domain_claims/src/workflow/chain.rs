//! Direct collaborator chain
//!
//! Four sequential remote calls, each feeding the next:
//!
//! ```text
//! normalize -> apply rules -> sign -> submit
//! ```
//!
//! Every step marks its stage in progress before the call and completed
//! after it. The first transport failure stops the chain with the stage still
//! in flight; later stages stay pending. A rejection from the bridge is a
//! successful call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use core_kernel::PortError;
use crate::claim::{Claim, ExecutionPathKind};
use crate::ledger::Stage;
use crate::ports::{
    BridgePort, CallContext, NormalizeRequest, NormalizedCode, NormalizerPort, PricedClaim, PricingRequest,
    RulesEnginePort, SignRequest, SignedPayload, SignerPort, SubmitRequest,
};
use super::{within_deadline, ClaimTracker, ExecutionStrategy, RunContext, StepTimeouts, WorkflowError};

/// A step of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainStep {
    Normalize,
    ApplyRules,
    Sign,
    Submit,
}

impl ChainStep {
    pub const ALL: [ChainStep; 4] = [
        ChainStep::Normalize,
        ChainStep::ApplyRules,
        ChainStep::Sign,
        ChainStep::Submit,
    ];

    /// Ledger stage the step drives
    pub fn stage(self) -> Stage {
        match self {
            ChainStep::Normalize => Stage::Normalization,
            ChainStep::ApplyRules => Stage::FinancialRules,
            ChainStep::Sign => Stage::Signing,
            ChainStep::Submit => Stage::NphiesSubmission,
        }
    }

    pub fn operation(self) -> &'static str {
        match self {
            ChainStep::Normalize => "normalize",
            ChainStep::ApplyRules => "apply_rules",
            ChainStep::Sign => "sign",
            ChainStep::Submit => "submit",
        }
    }

    fn timeout(self, timeouts: &StepTimeouts) -> Duration {
        match self {
            ChainStep::Normalize => timeouts.normalizer,
            ChainStep::ApplyRules => timeouts.rules,
            ChainStep::Sign => timeouts.signer,
            ChainStep::Submit => timeouts.bridge,
        }
    }

    fn start_message(self) -> &'static str {
        match self {
            ChainStep::Normalize => "Normalizing service code",
            ChainStep::ApplyRules => "Applying financial rules",
            ChainStep::Sign => "Signing claim payload",
            ChainStep::Submit => "Submitting to NPHIES",
        }
    }
}

/// Calls the four collaborators in sequence
pub struct FallbackChain {
    normalizer: Arc<dyn NormalizerPort>,
    rules: Arc<dyn RulesEnginePort>,
    signer: Arc<dyn SignerPort>,
    bridge: Arc<dyn BridgePort>,
    default_facility_id: String,
    timeouts: StepTimeouts,
}

impl FallbackChain {
    pub fn new(
        normalizer: Arc<dyn NormalizerPort>,
        rules: Arc<dyn RulesEnginePort>,
        signer: Arc<dyn SignerPort>,
        bridge: Arc<dyn BridgePort>,
        default_facility_id: String,
        timeouts: StepTimeouts,
    ) -> Self {
        Self {
            normalizer,
            rules,
            signer,
            bridge,
            default_facility_id,
            timeouts,
        }
    }

    fn facility_id(&self, claim: &Claim) -> String {
        claim
            .metadata
            .facility_id
            .clone()
            .unwrap_or_else(|| self.default_facility_id.clone())
    }

    /// Marks the step in progress and awaits the call under the step deadline
    async fn step<T, F>(
        &self,
        step: ChainStep,
        tracker: &mut ClaimTracker,
        ctx: &RunContext,
        call: impl FnOnce(CallContext) -> F + Send,
    ) -> Result<T, WorkflowError>
    where
        F: std::future::Future<Output = Result<T, PortError>> + Send,
    {
        tracker.start(step.stage(), step.start_message()).await?;
        let limit = step.timeout(&self.timeouts);
        debug!(stage = %step.stage(), timeout_ms = limit.as_millis() as u64, "Calling collaborator");

        within_deadline(step.operation(), limit, &ctx.cancel, call(ctx.call(limit)))
            .await
            .map_err(|e| WorkflowError::transport(step.stage(), e))
    }

    async fn normalize(
        &self,
        tracker: &mut ClaimTracker,
        ctx: &RunContext,
        facility_id: &str,
    ) -> Result<NormalizedCode, WorkflowError> {
        let request = normalize_request(tracker.claim(), facility_id);
        let normalizer = Arc::clone(&self.normalizer);
        let normalized = self
            .step(ChainStep::Normalize, tracker, ctx, |call| async move {
                normalizer.normalize(&request, &call).await
            })
            .await?;

        tracker
            .complete(
                Stage::Normalization,
                format!("Mapped to {} (confidence {:.2})", normalized.sbs_mapped_code, normalized.confidence),
                Some(json!(normalized)),
            )
            .await?;
        Ok(normalized)
    }

    async fn apply_rules(
        &self,
        tracker: &mut ClaimTracker,
        ctx: &RunContext,
        facility_id: &str,
        normalized: &NormalizedCode,
    ) -> Result<PricedClaim, WorkflowError> {
        let request = pricing_request(tracker.claim(), facility_id, normalized);
        let rules = Arc::clone(&self.rules);
        let priced = self
            .step(ChainStep::ApplyRules, tracker, ctx, |call| async move {
                rules.apply_rules(&request, &call).await
            })
            .await?;

        let currency = priced.total.currency.as_deref().unwrap_or("");
        tracker
            .complete(
                Stage::FinancialRules,
                format!("Priced at {} {}", priced.total.value, currency).trim_end().to_string(),
                Some(json!(priced)),
            )
            .await?;
        Ok(priced)
    }

    async fn sign(
        &self,
        tracker: &mut ClaimTracker,
        ctx: &RunContext,
        facility_id: &str,
        payload: serde_json::Value,
    ) -> Result<SignedPayload, WorkflowError> {
        let request = SignRequest {
            payload,
            facility_id: facility_id.to_string(),
        };
        let signer = Arc::clone(&self.signer);
        let signed = self
            .step(ChainStep::Sign, tracker, ctx, |call| async move {
                signer.sign(&request, &call).await
            })
            .await?;

        tracker
            .complete(
                Stage::Signing,
                format!("Signed with {}", signed.algorithm),
                Some(json!({ "algorithm": signed.algorithm })),
            )
            .await?;
        Ok(signed)
    }

    async fn submit(
        &self,
        tracker: &mut ClaimTracker,
        ctx: &RunContext,
        facility_id: &str,
        payload: serde_json::Value,
        signed: SignedPayload,
    ) -> Result<(), WorkflowError> {
        let request = SubmitRequest {
            payload,
            signature: signed.signature,
            facility_id: facility_id.to_string(),
        };
        let bridge = Arc::clone(&self.bridge);
        let receipt = self
            .step(ChainStep::Submit, tracker, ctx, |call| async move {
                bridge.submit(&request, &call).await
            })
            .await?;

        let response = json!(receipt);
        tracker
            .finish(
                format!("Transaction {} {}", receipt.transaction_id, receipt.status.as_str()),
                Some(response.clone()),
                receipt.status,
                response,
            )
            .await?;

        info!(
            transaction_id = %receipt.transaction_id,
            outcome = receipt.status.as_str(),
            "Bridge answered"
        );
        Ok(())
    }
}

#[async_trait]
impl ExecutionStrategy for FallbackChain {
    fn kind(&self) -> ExecutionPathKind {
        ExecutionPathKind::FallbackChain
    }

    async fn execute(&self, tracker: &mut ClaimTracker, ctx: &RunContext) -> Result<(), WorkflowError> {
        let facility_id = self.facility_id(tracker.claim());

        let normalized = self.normalize(tracker, ctx, &facility_id).await?;
        let priced = self.apply_rules(tracker, ctx, &facility_id, &normalized).await?;

        let payload = serde_json::to_value(&priced).map_err(|e| {
            WorkflowError::transport(
                Stage::Signing,
                PortError::transformation(format!("priced claim is not serializable: {}", e)),
            )
        })?;

        let signed = self.sign(tracker, ctx, &facility_id, payload.clone()).await?;
        self.submit(tracker, ctx, &facility_id, payload, signed).await
    }
}

fn normalize_request(claim: &Claim, facility_id: &str) -> NormalizeRequest {
    let metadata = &claim.metadata;
    NormalizeRequest {
        facility_id: facility_id.to_string(),
        internal_code: metadata
            .service_code
            .clone()
            .unwrap_or_else(|| claim.claim_type.default_service_code().to_string()),
        description: metadata.service_description.clone().unwrap_or_else(|| {
            format!("{} claim for patient {}", claim.claim_type.as_str(), claim.patient.id)
        }),
    }
}

fn pricing_request(claim: &Claim, facility_id: &str, normalized: &NormalizedCode) -> PricingRequest {
    let metadata = &claim.metadata;
    PricingRequest {
        facility_id: facility_id.to_string(),
        claim_id: claim.id.clone(),
        claim_type: claim.claim_type,
        patient_id: claim.patient.id.clone(),
        member_id: metadata.member_id.clone(),
        payer_id: metadata.payer_id.clone(),
        sbs_code: normalized.sbs_mapped_code.clone(),
        description: normalized
            .official_description
            .clone()
            .or_else(|| metadata.service_description.clone())
            .unwrap_or_default(),
        confidence: normalized.confidence,
    }
}
