//! Claims Domain Ports
//!
//! Port interfaces for everything the orchestrator depends on: the claim store
//! and the five remote collaborators. The coordinator only ever sees these
//! traits, so the in-memory store can be swapped for PostgreSQL and the HTTP
//! adapters for mocks without touching workflow code.
//!
//! ```rust,ignore
//! let repository: Arc<dyn ClaimRepository> = match config.store_backend {
//!     StoreBackend::Memory => Arc::new(InMemoryClaimStore::new()),
//!     StoreBackend::Postgres => Arc::new(PgClaimRepository::new(pool)),
//! };
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use core_kernel::{ClaimId, DomainPort, HealthCheckable, OperationMetadata, PortError};
use crate::claim::{AttachmentDescriptor, Claim, ClaimStatus, ClaimType, SubmissionStatus};
use crate::error::StoreError;

// ============================================================================
// Claim store
// ============================================================================

/// Pagination and filtering for claim listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub limit: usize,
    /// Only return claims in this status
    pub status: Option<ClaimStatus>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
        }
    }
}

impl ListQuery {
    /// Rows to skip; saturates for pages far past the end
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of claims, newest first
#[derive(Debug, Clone)]
pub struct ClaimPage {
    pub items: Vec<Claim>,
    /// Total number of matching claims across all pages
    pub total: usize,
}

/// Keyed claim storage
///
/// `save` is a compare-and-swap on [`Claim::version`]: it succeeds only when
/// the stored version equals the version carried by the argument, and returns
/// the stored claim with the bumped version.
#[async_trait]
pub trait ClaimRepository: DomainPort + HealthCheckable {
    /// Stores a new claim; fails with `Duplicate` if the id is taken
    async fn insert(&self, claim: Claim) -> Result<Claim, StoreError>;

    /// Fetches a claim by id
    async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError>;

    /// Version-checked update
    async fn save(&self, claim: &Claim) -> Result<Claim, StoreError>;

    /// Lists claims newest first
    async fn list(&self, query: &ListQuery) -> Result<ClaimPage, StoreError>;

    /// Drops claims created before `cutoff`, returning how many were removed
    async fn sweep(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Per-call context threaded into every remote call
#[derive(Debug, Clone)]
pub struct CallContext {
    pub metadata: OperationMetadata,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

/// Claim payload handed to the workflow orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub claim_id: ClaimId,
    pub patient_name: String,
    pub patient_id: String,
    pub claim_type: ClaimType,
    pub user_email: String,
    pub member_id: Option<String>,
    pub payer_id: Option<String>,
    pub provider_id: Option<String>,
    pub facility_id: String,
    pub service_code: Option<String>,
    pub service_description: Option<String>,
    pub attachment: Option<AttachmentDescriptor>,
    pub submitted_at: DateTime<Utc>,
}

/// Orchestrator acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationReceipt {
    pub claim_id: Option<String>,
    pub submission_id: Option<String>,
    pub tracking_url: Option<String>,
    pub status: String,
}

/// Normalizer input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeRequest {
    pub facility_id: String,
    pub internal_code: String,
    pub description: String,
}

/// Normalizer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCode {
    pub sbs_mapped_code: String,
    pub confidence: f64,
    #[serde(default)]
    pub official_description: Option<String>,
}

/// Rules engine input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub facility_id: String,
    pub claim_id: ClaimId,
    pub claim_type: ClaimType,
    pub patient_id: String,
    pub member_id: Option<String>,
    pub payer_id: Option<String>,
    pub sbs_code: String,
    pub description: String,
    pub confidence: f64,
}

/// Claim total as priced by the rules engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedTotal {
    pub value: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Priced claim; fields beyond the ones named here are carried through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedClaim {
    pub total: PricedTotal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup_percent: Option<Decimal>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Signer input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignRequest {
    pub payload: serde_json::Value,
    pub facility_id: String,
}

/// Signer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPayload {
    pub signature: String,
    pub algorithm: String,
}

/// Bridge input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub payload: serde_json::Value,
    pub signature: String,
    pub facility_id: String,
}

/// Bridge output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub transaction_id: String,
    pub status: SubmissionStatus,
}

/// External workflow engine
#[async_trait]
pub trait OrchestratorPort: DomainPort {
    async fn start_workflow(
        &self,
        request: &OrchestrationRequest,
        ctx: &CallContext,
    ) -> Result<OrchestrationReceipt, PortError>;
}

/// Code normalization service
#[async_trait]
pub trait NormalizerPort: DomainPort {
    async fn normalize(
        &self,
        request: &NormalizeRequest,
        ctx: &CallContext,
    ) -> Result<NormalizedCode, PortError>;
}

/// Financial rules engine
#[async_trait]
pub trait RulesEnginePort: DomainPort {
    async fn apply_rules(
        &self,
        request: &PricingRequest,
        ctx: &CallContext,
    ) -> Result<PricedClaim, PortError>;
}

/// Claim signing service
#[async_trait]
pub trait SignerPort: DomainPort {
    async fn sign(&self, request: &SignRequest, ctx: &CallContext) -> Result<SignedPayload, PortError>;
}

/// National gateway bridge
#[async_trait]
pub trait BridgePort: DomainPort {
    async fn submit(
        &self,
        request: &SubmitRequest,
        ctx: &CallContext,
    ) -> Result<SubmissionReceipt, PortError>;
}

/// Scriptable collaborators for testing
///
/// A single [`mock::MockCollaborators`] implements all five collaborator
/// ports. Each step can be told to succeed, fail with a given transport error,
/// or stall for a while, and every call is counted.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use rust_decimal_macros::dec;
    use serde_json::json;

    /// Collaborator call sites
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockStep {
        Orchestrator,
        Normalize,
        ApplyRules,
        Sign,
        Submit,
    }

    impl MockStep {
        pub const CHAIN: [MockStep; 4] = [
            MockStep::Normalize,
            MockStep::ApplyRules,
            MockStep::Sign,
            MockStep::Submit,
        ];

        fn operation(self) -> &'static str {
            match self {
                MockStep::Orchestrator => "start_workflow",
                MockStep::Normalize => "normalize",
                MockStep::ApplyRules => "apply_rules",
                MockStep::Sign => "sign",
                MockStep::Submit => "submit",
            }
        }
    }

    /// Transport failure to inject
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockFailure {
        Timeout,
        Connection,
        Unavailable,
        BadResponse,
    }

    impl MockFailure {
        fn into_error(self, step: MockStep) -> PortError {
            match self {
                MockFailure::Timeout => PortError::timeout(step.operation(), 1_000),
                MockFailure::Connection => PortError::connection("connection refused"),
                MockFailure::Unavailable => PortError::unavailable(step.operation()),
                MockFailure::BadResponse => PortError::transformation("unexpected response body"),
            }
        }
    }

    /// What a step does when called
    #[derive(Debug, Clone, PartialEq)]
    pub enum StepBehavior {
        Succeed,
        Fail(MockFailure),
        /// Sleep before answering successfully; used to exceed step timeouts
        Delay(Duration),
    }

    #[derive(Debug)]
    struct Script {
        behaviors: HashMap<MockStep, StepBehavior>,
        calls: HashMap<MockStep, usize>,
        bridge_status: SubmissionStatus,
        orchestrator_status: String,
    }

    /// In-memory implementation of every collaborator port
    #[derive(Debug)]
    pub struct MockCollaborators {
        script: Mutex<Script>,
    }

    impl Default for MockCollaborators {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockCollaborators {
        /// All steps succeed; the bridge accepts
        pub fn new() -> Self {
            Self {
                script: Mutex::new(Script {
                    behaviors: HashMap::new(),
                    calls: HashMap::new(),
                    bridge_status: SubmissionStatus::Accepted,
                    orchestrator_status: "submitted".to_string(),
                }),
            }
        }

        pub fn with_behavior(self, step: MockStep, behavior: StepBehavior) -> Self {
            self.set_behavior(step, behavior);
            self
        }

        pub fn with_failure(self, step: MockStep, failure: MockFailure) -> Self {
            self.with_behavior(step, StepBehavior::Fail(failure))
        }

        pub fn with_delay(self, step: MockStep, delay: Duration) -> Self {
            self.with_behavior(step, StepBehavior::Delay(delay))
        }

        pub fn with_bridge_status(self, status: SubmissionStatus) -> Self {
            self.set_bridge_status(status);
            self
        }

        pub fn with_orchestrator_status(self, status: impl Into<String>) -> Self {
            self.lock().orchestrator_status = status.into();
            self
        }

        pub fn set_behavior(&self, step: MockStep, behavior: StepBehavior) {
            self.lock().behaviors.insert(step, behavior);
        }

        pub fn set_bridge_status(&self, status: SubmissionStatus) {
            self.lock().bridge_status = status;
        }

        /// Wires this mock into every collaborator slot
        ///
        /// The orchestrator slot stays empty unless `with_orchestrator` is set,
        /// which makes the chain the primary path.
        pub fn collaborators(self: &std::sync::Arc<Self>, with_orchestrator: bool) -> crate::workflow::Collaborators {
            crate::workflow::Collaborators {
                orchestrator: with_orchestrator
                    .then(|| self.clone() as std::sync::Arc<dyn OrchestratorPort>),
                normalizer: self.clone(),
                rules: self.clone(),
                signer: self.clone(),
                bridge: self.clone(),
            }
        }

        /// Number of calls received by a step
        pub fn calls(&self, step: MockStep) -> usize {
            self.lock().calls.get(&step).copied().unwrap_or(0)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        async fn invoke(&self, step: MockStep, ctx: &CallContext) -> Result<(), PortError> {
            let behavior = {
                let mut script = self.lock();
                *script.calls.entry(step).or_insert(0) += 1;
                script.behaviors.get(&step).cloned().unwrap_or(StepBehavior::Succeed)
            };

            match behavior {
                StepBehavior::Succeed => Ok(()),
                StepBehavior::Fail(failure) => Err(failure.into_error(step)),
                StepBehavior::Delay(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => Ok(()),
                        _ = ctx.cancel.cancelled() => Err(PortError::cancelled(step.operation())),
                    }
                }
            }
        }
    }

    impl DomainPort for MockCollaborators {}

    #[async_trait]
    impl OrchestratorPort for MockCollaborators {
        async fn start_workflow(
            &self,
            request: &OrchestrationRequest,
            ctx: &CallContext,
        ) -> Result<OrchestrationReceipt, PortError> {
            self.invoke(MockStep::Orchestrator, ctx).await?;
            let status = self.lock().orchestrator_status.clone();
            Ok(OrchestrationReceipt {
                claim_id: Some(request.claim_id.to_string()),
                submission_id: Some(format!("SUB-{}", uuid::Uuid::now_v7())),
                tracking_url: Some(format!("https://orchestrator.test/claims/{}", request.claim_id)),
                status,
            })
        }
    }

    #[async_trait]
    impl NormalizerPort for MockCollaborators {
        async fn normalize(
            &self,
            request: &NormalizeRequest,
            ctx: &CallContext,
        ) -> Result<NormalizedCode, PortError> {
            self.invoke(MockStep::Normalize, ctx).await?;
            Ok(NormalizedCode {
                sbs_mapped_code: format!("SBS-{}", request.internal_code),
                confidence: 0.92,
                official_description: Some(request.description.clone()),
            })
        }
    }

    #[async_trait]
    impl RulesEnginePort for MockCollaborators {
        async fn apply_rules(
            &self,
            request: &PricingRequest,
            ctx: &CallContext,
        ) -> Result<PricedClaim, PortError> {
            self.invoke(MockStep::ApplyRules, ctx).await?;
            let mut extra = serde_json::Map::new();
            extra.insert("sbs_code".to_string(), json!(request.sbs_code));
            Ok(PricedClaim {
                total: PricedTotal {
                    value: dec!(172.50),
                    currency: Some("SAR".to_string()),
                },
                net_amount: Some(dec!(150.00)),
                gross_amount: Some(dec!(172.50)),
                markup_percent: Some(dec!(15)),
                extra,
            })
        }
    }

    #[async_trait]
    impl SignerPort for MockCollaborators {
        async fn sign(&self, _request: &SignRequest, ctx: &CallContext) -> Result<SignedPayload, PortError> {
            self.invoke(MockStep::Sign, ctx).await?;
            Ok(SignedPayload {
                signature: "bW9jay1zaWduYXR1cmU=".to_string(),
                algorithm: "RS256".to_string(),
            })
        }
    }

    #[async_trait]
    impl BridgePort for MockCollaborators {
        async fn submit(
            &self,
            _request: &SubmitRequest,
            ctx: &CallContext,
        ) -> Result<SubmissionReceipt, PortError> {
            self.invoke(MockStep::Submit, ctx).await?;
            let status = self.lock().bridge_status;
            Ok(SubmissionReceipt {
                transaction_id: format!("TXN-{}", uuid::Uuid::now_v7()),
                status,
            })
        }
    }
}
