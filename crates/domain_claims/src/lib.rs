//! Claim Lifecycle Domain
//!
//! This crate tracks medical billing claims from submission to a gateway
//! outcome. Every claim carries a fixed six-stage ledger:
//!
//! ```text
//! received -> validation -> normalization -> financialRules -> signing -> nphiesSubmission
//! ```
//!
//! The overall [`ClaimStatus`] is always derived from the ledger. Runs are
//! executed by the [`WorkflowCoordinator`], either through the external
//! orchestrator or through the direct collaborator chain.

pub mod adapters;
pub mod claim;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod ports;
pub mod progress;
pub mod retry;
pub mod store;
pub mod sweeper;
pub mod validation;
pub mod workflow;

pub use claim::{
    AttachmentDescriptor, Claim, ClaimStatus, ClaimType, ErrorCategory, ErrorEntry, ExecutionPathKind,
    PatientRef, SubmissionMetadata, SubmissionStatus,
};
pub use error::{ClaimError, StoreError};
pub use intake::{ClaimIntake, Submitted};
pub use ledger::{LedgerError, Stage, StageEntry, StageLedger, StageStatus};
pub use ports::{ClaimPage, ClaimRepository, ListQuery};
pub use progress::{progress, status_report, ClaimStatusReport, Progress};
pub use retry::{RetryAccepted, RetryController};
pub use store::InMemoryClaimStore;
pub use sweeper::{spawn_retention_sweep, sweep_once, RetentionPolicy};
pub use validation::{ClaimSubmission, SubmissionValidator, DEFAULT_MAX_ATTACHMENT_BYTES};
pub use workflow::{
    Collaborators, ExecutionStrategy, StepTimeouts, WorkflowCoordinator, WorkflowError, WorkflowSettings,
};
