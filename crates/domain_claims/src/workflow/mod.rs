//! Claim Workflow Coordination
//!
//! The coordinator drives one claim through the stage ledger. Each run:
//!
//! 1. marks `validation` completed
//! 2. executes the primary [`ExecutionStrategy`]
//! 3. on a transport failure, executes the fallback strategy when one is configured
//! 4. records the outcome (or the failure) and the total processing time
//!
//! Two strategies exist:
//!
//! - [`OrchestratedPath`] hands the whole claim to the external workflow
//!   engine and completes the remaining stages in bulk on success
//! - [`FallbackChain`] calls normalizer, rules engine, signer and bridge in
//!   sequence, updating the ledger around every call
//!
//! Every ledger transition is persisted immediately through a
//! [`ClaimTracker`], so pollers observe progress while the run is underway.
//!
//! # Example
//!
//! ```rust,ignore
//! let coordinator = Arc::new(WorkflowCoordinator::from_settings(
//!     repository.clone(),
//!     collaborators,
//!     &WorkflowSettings::default(),
//!     shutdown.clone(),
//! ));
//! let handle = coordinator.spawn(claim);
//! ```

pub mod chain;
pub mod orchestrated;
pub mod tracker;

pub use chain::{ChainStep, FallbackChain};
pub use orchestrated::OrchestratedPath;
pub use tracker::ClaimTracker;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use core_kernel::{OperationMetadata, PortError, RunId};
use crate::claim::{Claim, ErrorCategory, ErrorEntry, ExecutionPathKind};
use crate::error::StoreError;
use crate::ledger::{LedgerError, Stage};
use crate::ports::{
    BridgePort, CallContext, ClaimRepository, NormalizerPort, OrchestratorPort, RulesEnginePort,
    SignerPort,
};

/// Facility used when a submission does not name one
pub const DEFAULT_FACILITY_ID: &str = "FAC-DEFAULT";

/// Per-collaborator call limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    pub orchestrator: Duration,
    pub normalizer: Duration,
    pub rules: Duration,
    pub signer: Duration,
    pub bridge: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            orchestrator: Duration::from_secs(30),
            normalizer: Duration::from_secs(10),
            rules: Duration::from_secs(10),
            signer: Duration::from_secs(10),
            bridge: Duration::from_secs(30),
        }
    }
}

/// Settings shared by every run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Fall back to the direct chain when the orchestrator fails
    pub fallback_enabled: bool,
    pub default_facility_id: String,
    pub timeouts: StepTimeouts,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            default_facility_id: DEFAULT_FACILITY_ID.to_string(),
            timeouts: StepTimeouts::default(),
        }
    }
}

/// Remote collaborators available to the strategies
#[derive(Clone)]
pub struct Collaborators {
    /// Absent when no orchestrator endpoint is configured
    pub orchestrator: Option<Arc<dyn OrchestratorPort>>,
    pub normalizer: Arc<dyn NormalizerPort>,
    pub rules: Arc<dyn RulesEnginePort>,
    pub signer: Arc<dyn SignerPort>,
    pub bridge: Arc<dyn BridgePort>,
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A remote call failed or timed out while `stage` was in flight
    #[error("{stage} failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: PortError,
    },

    /// Another writer (a retry) replaced the claim while this run was active
    #[error("run superseded by a newer version of the claim")]
    Superseded,

    #[error("claim store error: {0}")]
    Store(StoreError),

    #[error("invalid ledger transition: {0}")]
    Ledger(#[from] LedgerError),
}

impl WorkflowError {
    pub fn transport(stage: Stage, source: PortError) -> Self {
        WorkflowError::Transport { stage, source }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            WorkflowError::Superseded
        } else {
            WorkflowError::Store(err)
        }
    }
}

/// Identity and cancellation scope of a single run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub metadata: OperationMetadata,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Call context for one remote call
    pub fn call(&self, timeout: Duration) -> CallContext {
        CallContext {
            metadata: self.metadata.clone(),
            cancel: self.cancel.clone(),
            timeout,
        }
    }
}

/// One way of carrying a claim from `validation` to a gateway outcome
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Which path this strategy represents
    fn kind(&self) -> ExecutionPathKind;

    /// Runs the claim held by `tracker` to completion
    ///
    /// Returns `WorkflowError::Transport` naming the stage that was in flight
    /// when a remote call failed. The caller records the failure.
    async fn execute(&self, tracker: &mut ClaimTracker, ctx: &RunContext) -> Result<(), WorkflowError>;
}

/// Awaits a remote call under a deadline, giving up early on cancellation
pub(crate) async fn within_deadline<T, F>(
    operation: &'static str,
    limit: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(PortError::cancelled(operation)),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(outcome) => outcome,
            Err(_) => Err(PortError::timeout(operation, limit.as_millis() as u64)),
        },
    }
}

/// Drives claims through the pipeline
pub struct WorkflowCoordinator {
    repository: Arc<dyn ClaimRepository>,
    primary: Arc<dyn ExecutionStrategy>,
    fallback: Option<Arc<dyn ExecutionStrategy>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("primary", &self.primary.kind())
            .field("fallback", &self.fallback.as_ref().map(|s| s.kind()))
            .finish_non_exhaustive()
    }
}

impl WorkflowCoordinator {
    pub fn new(
        repository: Arc<dyn ClaimRepository>,
        primary: Arc<dyn ExecutionStrategy>,
        fallback: Option<Arc<dyn ExecutionStrategy>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repository,
            primary,
            fallback,
            shutdown,
        }
    }

    /// Builds the strategy pair from configuration
    ///
    /// | orchestrator | fallback_enabled | primary      | fallback |
    /// |--------------|------------------|--------------|----------|
    /// | configured   | true             | orchestrated | chain    |
    /// | configured   | false            | orchestrated | none     |
    /// | absent       | any              | chain        | none     |
    pub fn from_settings(
        repository: Arc<dyn ClaimRepository>,
        collaborators: Collaborators,
        settings: &WorkflowSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let chain: Arc<dyn ExecutionStrategy> = Arc::new(FallbackChain::new(
            collaborators.normalizer,
            collaborators.rules,
            collaborators.signer,
            collaborators.bridge,
            settings.default_facility_id.clone(),
            settings.timeouts,
        ));

        match collaborators.orchestrator {
            Some(orchestrator) => {
                let orchestrated: Arc<dyn ExecutionStrategy> = Arc::new(OrchestratedPath::new(
                    orchestrator,
                    settings.default_facility_id.clone(),
                    settings.timeouts.orchestrator,
                ));
                let fallback = settings.fallback_enabled.then_some(chain);
                Self::new(repository, orchestrated, fallback, shutdown)
            }
            None => Self::new(repository, chain, None, shutdown),
        }
    }

    pub fn primary_path(&self) -> ExecutionPathKind {
        self.primary.kind()
    }

    pub fn fallback_path(&self) -> Option<ExecutionPathKind> {
        self.fallback.as_ref().map(|s| s.kind())
    }

    /// Runs the claim on its own task
    pub fn spawn(self: &Arc<Self>, claim: Claim) -> JoinHandle<Result<Claim, WorkflowError>> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run(claim).await })
    }

    /// Runs the claim to a terminal status and returns the final record
    ///
    /// Transport failures are captured into the claim and do not surface as
    /// errors here. `Err` means the run could not record its result at all:
    /// either it was superseded or the store failed.
    pub async fn run(&self, claim: Claim) -> Result<Claim, WorkflowError> {
        let run_id = RunId::new();
        let span = info_span!("claim_run", claim_id = %claim.id, run_id = %run_id);
        self.run_inner(run_id, claim).instrument(span).await
    }

    async fn run_inner(&self, run_id: RunId, claim: Claim) -> Result<Claim, WorkflowError> {
        let started = Instant::now();
        let ctx = RunContext {
            run_id,
            metadata: OperationMetadata::with_correlation_id(claim.id.to_string())
                .with_context("run_id", run_id.to_string()),
            cancel: self.shutdown.child_token(),
        };

        let mut tracker = ClaimTracker::new(Arc::clone(&self.repository), claim);
        let primary = self.primary.kind();
        tracker
            .update(|claim| {
                claim.record_run(run_id, primary);
                claim.complete_stage(Stage::Validation, "Submission validated", None)
            })
            .await?;

        info!(path = ?primary, "Claim run started");

        let mut outcome = self.primary.execute(&mut tracker, &ctx).await;

        let switch = match (&outcome, &self.fallback) {
            (Err(WorkflowError::Transport { stage, source }), Some(fallback)) => {
                warn!(
                    stage = %stage,
                    error = %source,
                    fallback = ?fallback.kind(),
                    "Primary path failed, switching to fallback"
                );
                Some(Arc::clone(fallback))
            }
            _ => None,
        };

        if let Some(fallback) = switch {
            let kind = fallback.kind();
            tracker
                .update(|claim| {
                    claim.record_run(run_id, kind);
                    Ok(())
                })
                .await?;
            outcome = fallback.execute(&mut tracker, &ctx).await;
        }

        let elapsed = started.elapsed();
        match outcome {
            Ok(()) => {
                tracker
                    .update(|claim| {
                        claim.record_duration(elapsed);
                        Ok(())
                    })
                    .await?;
                info!(
                    status = %tracker.claim().status(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Claim run finished"
                );
            }
            Err(WorkflowError::Transport { stage, source }) => {
                error!(stage = %stage, error = %source, "Claim run failed");
                tracker
                    .update(|claim| {
                        claim.fail_in_flight(ErrorEntry::transport(stage, &source));
                        claim.record_duration(elapsed);
                        Ok(())
                    })
                    .await?;
            }
            Err(WorkflowError::Superseded) => {
                info!("Claim run superseded, stopping");
                return Err(WorkflowError::Superseded);
            }
            Err(err) => {
                error!(error = %err, "Claim run aborted");
                let category = match err {
                    WorkflowError::Store(_) => ErrorCategory::Store,
                    _ => ErrorCategory::Internal,
                };
                let mut entry = ErrorEntry::internal(None, err.to_string());
                entry.category = category;
                if let Err(record_err) = tracker
                    .update(|claim| {
                        claim.fail_in_flight(entry);
                        claim.record_duration(elapsed);
                        Ok(())
                    })
                    .await
                {
                    warn!(error = %record_err, "Could not record run failure");
                }
                return Err(err);
            }
        }

        Ok(tracker.into_claim())
    }
}
