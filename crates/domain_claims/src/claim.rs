//! Claim aggregate

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClaimId, PortError, RunId};
use crate::ledger::{LedgerError, Stage, StageLedger, StageStatus};

/// Type of claim being billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Professional,
    Institutional,
    Pharmacy,
    Vision,
}

impl ClaimType {
    pub const ALL: [ClaimType; 4] = [
        ClaimType::Professional,
        ClaimType::Institutional,
        ClaimType::Pharmacy,
        ClaimType::Vision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimType::Professional => "professional",
            ClaimType::Institutional => "institutional",
            ClaimType::Pharmacy => "pharmacy",
            ClaimType::Vision => "vision",
        }
    }

    /// Internal service code used when the submission carries none
    pub fn default_service_code(self) -> &'static str {
        match self {
            ClaimType::Professional => "PROFESSIONAL",
            ClaimType::Institutional => "INSTITUTIONAL",
            ClaimType::Pharmacy => "PHARMACY",
            ClaimType::Vision => "VISION",
        }
    }
}

impl FromStr for ClaimType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ClaimType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown claim type '{}'", s))
    }
}

/// Overall claim status, always derived from the stage ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Persisted and queued; validation not yet recorded by a run
    Received,
    /// Run started, waiting on the first remote call
    Processing,
    Normalizing,
    ApplyingRules,
    RulesApplied,
    Signing,
    Signed,
    Submitting,
    /// Gateway acknowledged without a final decision
    Submitted,
    Accepted,
    /// Gateway declined the claim (business outcome, not a failure)
    Rejected,
    /// A remote call failed and processing stopped
    Error,
}

impl ClaimStatus {
    /// Derives the overall status from the ledger and the recorded gateway outcome
    pub fn derive(ledger: &StageLedger, outcome: Option<SubmissionStatus>) -> Self {
        if ledger.failed_stage().is_some() {
            return ClaimStatus::Error;
        }

        let Some(stage) = ledger.first_incomplete() else {
            return match outcome {
                Some(SubmissionStatus::Accepted) => ClaimStatus::Accepted,
                Some(SubmissionStatus::Rejected) => ClaimStatus::Rejected,
                Some(SubmissionStatus::Submitted) | None => ClaimStatus::Submitted,
            };
        };

        let running = ledger.status_of(stage) == StageStatus::InProgress;
        match (stage, running) {
            (Stage::Received | Stage::Validation, _) => ClaimStatus::Received,
            (Stage::Normalization, false) => ClaimStatus::Processing,
            (Stage::Normalization, true) => ClaimStatus::Normalizing,
            (Stage::FinancialRules, false) => ClaimStatus::Normalizing,
            (Stage::FinancialRules, true) => ClaimStatus::ApplyingRules,
            (Stage::Signing, false) => ClaimStatus::RulesApplied,
            (Stage::Signing, true) => ClaimStatus::Signing,
            (Stage::NphiesSubmission, false) => ClaimStatus::Signed,
            (Stage::NphiesSubmission, true) => ClaimStatus::Submitting,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Received => "received",
            ClaimStatus::Processing => "processing",
            ClaimStatus::Normalizing => "normalizing",
            ClaimStatus::ApplyingRules => "applying_rules",
            ClaimStatus::RulesApplied => "rules_applied",
            ClaimStatus::Signing => "signing",
            ClaimStatus::Signed => "signed",
            ClaimStatus::Submitting => "submitting",
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::Accepted => "accepted",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Error => "error",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClaimStatus::Received => "Received",
            ClaimStatus::Processing => "Processing",
            ClaimStatus::Normalizing => "Normalizing codes",
            ClaimStatus::ApplyingRules => "Applying financial rules",
            ClaimStatus::RulesApplied => "Financial rules applied",
            ClaimStatus::Signing => "Signing claim",
            ClaimStatus::Signed => "Claim signed",
            ClaimStatus::Submitting => "Submitting to NPHIES",
            ClaimStatus::Submitted => "Submitted to NPHIES",
            ClaimStatus::Accepted => "Accepted by payer",
            ClaimStatus::Rejected => "Rejected by payer",
            ClaimStatus::Error => "Processing error",
        }
    }

    /// Terminal statuses: no run will touch the claim again without a retry
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            ClaimStatus::Submitted
                | ClaimStatus::Accepted
                | ClaimStatus::Rejected
                | ClaimStatus::Error
        )
    }

    /// A run is queued or executing
    pub fn is_in_flight(self) -> bool {
        !self.is_complete()
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ClaimStatus::*;
        [
            Received, Processing, Normalizing, ApplyingRules, RulesApplied, Signing, Signed,
            Submitting, Submitted, Accepted, Rejected, Error,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| format!("unknown claim status '{}'", s))
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final business status reported by the gateway bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Accepted,
    Rejected,
    Submitted,
}

impl SubmissionStatus {
    /// Maps a free-form status reported by the workflow orchestrator
    pub fn from_orchestrator(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "accepted" | "approved" => SubmissionStatus::Accepted,
            "rejected" | "denied" => SubmissionStatus::Rejected,
            _ => SubmissionStatus::Submitted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Submitted => "submitted",
        }
    }
}

/// Which execution strategy drove the latest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPathKind {
    Orchestrator,
    FallbackChain,
}

/// Patient the claim is billed for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRef {
    pub name: String,
    pub id: String,
}

/// Submission context captured at ingress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub user_email: String,
    pub member_id: Option<String>,
    pub payer_id: Option<String>,
    pub provider_id: Option<String>,
    pub facility_id: Option<String>,
    pub service_code: Option<String>,
    pub service_description: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Descriptor of an uploaded supporting document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub reference: Option<String>,
}

/// Broad category of a recorded processing error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A remote call failed or timed out
    Transport,
    /// The claim store rejected a write
    Store,
    /// An invariant was violated inside the service
    Internal,
}

/// Entry of the claim's append-only error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub stage: Option<Stage>,
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn transport(stage: Stage, error: &PortError) -> Self {
        Self {
            stage: Some(stage),
            category: ErrorCategory::Transport,
            code: error.kind().to_string(),
            message: error.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn internal(stage: Option<Stage>, message: impl Into<String>) -> Self {
        Self {
            stage,
            category: ErrorCategory::Internal,
            code: "internal".to_string(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// A medical billing claim tracked through the processing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Unique identifier
    pub id: ClaimId,
    /// Patient reference
    pub patient: PatientRef,
    /// Claim type
    pub claim_type: ClaimType,
    /// Submission metadata
    pub metadata: SubmissionMetadata,
    /// Optional supporting document
    pub attachment: Option<AttachmentDescriptor>,
    status: ClaimStatus,
    ledger: StageLedger,
    errors: Vec<ErrorEntry>,
    submission_status: Option<SubmissionStatus>,
    /// Raw payload returned by the orchestrator or the bridge
    pub external_response: Option<serde_json::Value>,
    /// Wall time of the latest run in milliseconds
    pub processing_duration_ms: Option<u64>,
    /// Strategy that drove the latest run
    pub execution_path: Option<ExecutionPathKind>,
    /// Identifier of the latest run
    pub last_run_id: Option<RunId>,
    /// Number of accepted manual retries
    pub retry_count: u32,
    /// Optimistic concurrency stamp, bumped by the store on each save
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Creates a newly received claim
    pub fn receive(
        id: ClaimId,
        patient: PatientRef,
        claim_type: ClaimType,
        metadata: SubmissionMetadata,
        attachment: Option<AttachmentDescriptor>,
    ) -> Self {
        let now = Utc::now();
        let ledger = StageLedger::new();

        Self {
            id,
            patient,
            claim_type,
            metadata,
            attachment,
            status: ClaimStatus::derive(&ledger, None),
            ledger,
            errors: Vec::new(),
            submission_status: None,
            external_response: None,
            processing_duration_ms: None,
            execution_path: None,
            last_run_id: None,
            retry_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> ClaimStatus {
        self.status
    }

    pub fn ledger(&self) -> &StageLedger {
        &self.ledger
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn submission_status(&self) -> Option<SubmissionStatus> {
        self.submission_status
    }

    /// Marks a stage as in progress
    pub fn start_stage(&mut self, stage: Stage, message: impl Into<String>) -> Result<(), LedgerError> {
        self.ledger.start(stage, message)?;
        self.refresh();
        Ok(())
    }

    /// Marks a stage as completed
    pub fn complete_stage(
        &mut self,
        stage: Stage,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        self.ledger.complete(stage, message, data)?;
        self.refresh();
        Ok(())
    }

    /// Fails the stage that was in flight and appends the error
    ///
    /// When no stage is in progress the first incomplete stage is failed, so
    /// the ledger always shows where processing stopped. Returns the failed stage.
    pub fn fail_in_flight(&mut self, mut entry: ErrorEntry) -> Option<Stage> {
        let stage = self.ledger.in_progress().or_else(|| self.ledger.first_incomplete());
        if let Some(stage) = stage {
            // `stage` is open by construction
            let _ = self.ledger.fail(stage, entry.message.clone());
            entry.stage = Some(stage);
        }
        self.errors.push(entry);
        self.refresh();
        stage
    }

    /// Records the gateway outcome and the raw response
    pub fn record_outcome(&mut self, status: SubmissionStatus, response: serde_json::Value) {
        self.submission_status = Some(status);
        self.external_response = Some(response);
        self.refresh();
    }

    /// Records run bookkeeping
    pub fn record_run(&mut self, run_id: RunId, path: ExecutionPathKind) {
        self.last_run_id = Some(run_id);
        self.execution_path = Some(path);
        self.updated_at = Utc::now();
    }

    pub fn record_duration(&mut self, elapsed: Duration) {
        self.processing_duration_ms = Some(elapsed.as_millis() as u64);
        self.updated_at = Utc::now();
    }

    /// Returns the claim to `received` for a manual retry
    pub fn reset_for_retry(&mut self) {
        self.ledger.reset_for_retry();
        self.errors.clear();
        self.submission_status = None;
        self.external_response = None;
        self.processing_duration_ms = None;
        self.retry_count += 1;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.status = ClaimStatus::derive(&self.ledger, self.submission_status);
        self.updated_at = Utc::now();
    }
}
