//! Claim status reporting
//!
//! [`status_report`] is a pure projection of a claim record: it performs no
//! I/O and reads no clock, so pollers may call it at any rate and get the same
//! answer until the claim itself changes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use core_kernel::ClaimId;
use crate::claim::{Claim, ClaimStatus, ErrorEntry};
use crate::ledger::{Stage, StageEntry, StageStatus};

/// Per-stage view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub status: StageStatus,
    pub label: &'static str,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl From<&StageEntry> for StageView {
    fn from(entry: &StageEntry) -> Self {
        Self {
            status: entry.status,
            label: entry.stage.label(),
            timestamp: entry.timestamp,
            message: entry.message.clone(),
        }
    }
}

/// All stages keyed by wire name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagesView {
    pub received: StageView,
    pub validation: StageView,
    pub normalization: StageView,
    pub financial_rules: StageView,
    pub signing: StageView,
    pub nphies_submission: StageView,
}

/// Progress summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Rounded share of completed stages, 0..=100
    pub percentage: u8,
    pub current_stage: Stage,
    pub current_stage_label: &'static str,
    pub completed_stages: usize,
    pub total_stages: usize,
}

/// Status document returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatusReport {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub status_label: &'static str,
    pub stages: StagesView,
    pub progress: Progress,
    pub is_complete: bool,
    pub errors: Vec<ErrorEntry>,
    pub processing_duration_ms: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// Computes progress from the ledger
pub fn progress(claim: &Claim) -> Progress {
    let ledger = claim.ledger();
    let completed = ledger.completed_count();
    let current = ledger.current_stage();

    Progress {
        percentage: percentage(completed),
        current_stage: current,
        current_stage_label: current.label(),
        completed_stages: completed,
        total_stages: Stage::COUNT,
    }
}

/// Builds the full status report for a claim
pub fn status_report(claim: &Claim) -> ClaimStatusReport {
    let ledger = claim.ledger();
    let view = |stage: Stage| StageView::from(ledger.entry(stage));
    let status = claim.status();

    ClaimStatusReport {
        claim_id: claim.id.clone(),
        status,
        status_label: status.label(),
        stages: StagesView {
            received: view(Stage::Received),
            validation: view(Stage::Validation),
            normalization: view(Stage::Normalization),
            financial_rules: view(Stage::FinancialRules),
            signing: view(Stage::Signing),
            nphies_submission: view(Stage::NphiesSubmission),
        },
        progress: progress(claim),
        is_complete: status.is_complete(),
        errors: claim.errors().to_vec(),
        processing_duration_ms: claim.processing_duration_ms,
        updated_at: claim.updated_at,
    }
}

fn percentage(completed: usize) -> u8 {
    let total = Stage::COUNT as f64;
    ((completed as f64 / total) * 100.0).round() as u8
}
