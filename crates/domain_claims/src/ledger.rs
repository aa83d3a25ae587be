//! Stage ledger
//!
//! The ledger records how far a claim has progressed through the fixed
//! six-stage pipeline. Entries live in a fixed-size array indexed by
//! [`Stage`], so the order cannot drift at runtime.
//!
//! ```text
//! received -> validation -> normalization -> financialRules -> signing -> nphiesSubmission
//! ```
//!
//! Transition rules enforced here:
//! - a stage moves to `in_progress` or `completed` only once its predecessor is `completed`
//! - at most one stage is `in_progress`
//! - `completed` and `failed` entries are final until [`StageLedger::reset_for_retry`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named step of the processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Received,
    Validation,
    Normalization,
    FinancialRules,
    Signing,
    NphiesSubmission,
}

impl Stage {
    /// Number of stages in the pipeline
    pub const COUNT: usize = 6;

    /// Fixed processing order
    pub const ORDER: [Stage; Stage::COUNT] = [
        Stage::Received,
        Stage::Validation,
        Stage::Normalization,
        Stage::FinancialRules,
        Stage::Signing,
        Stage::NphiesSubmission,
    ];

    /// Position of the stage in [`Stage::ORDER`]
    pub const fn index(self) -> usize {
        match self {
            Stage::Received => 0,
            Stage::Validation => 1,
            Stage::Normalization => 2,
            Stage::FinancialRules => 3,
            Stage::Signing => 4,
            Stage::NphiesSubmission => 5,
        }
    }

    /// The stage that must be completed before this one may start
    pub fn predecessor(self) -> Option<Stage> {
        match self.index() {
            0 => None,
            i => Some(Stage::ORDER[i - 1]),
        }
    }

    /// Wire name, as used in status responses
    pub fn name(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validation => "validation",
            Stage::Normalization => "normalization",
            Stage::FinancialRules => "financialRules",
            Stage::Signing => "signing",
            Stage::NphiesSubmission => "nphiesSubmission",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Stage::Received => "Claim Received",
            Stage::Validation => "Validation",
            Stage::Normalization => "Code Normalization",
            Stage::FinancialRules => "Financial Rules",
            Stage::Signing => "Digital Signing",
            Stage::NphiesSubmission => "NPHIES Submission",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a single ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

/// One row of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Snapshot of the collaborator output that completed the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StageEntry {
    fn pending(stage: Stage, at: DateTime<Utc>) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            timestamp: at,
            message: "Waiting".to_string(),
            data: None,
        }
    }

    fn set(&mut self, status: StageStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
        self.timestamp = Utc::now();
    }
}

/// Rejected ledger transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("cannot advance {stage}: predecessor {predecessor} is not completed")]
    PredecessorIncomplete { stage: Stage, predecessor: Stage },

    #[error("cannot start {stage}: {active} is already in progress")]
    AnotherStageInProgress { stage: Stage, active: Stage },

    #[error("stage {0} is already completed")]
    AlreadyCompleted(Stage),

    #[error("stage {0} has failed")]
    AlreadyFailed(Stage),

    #[error("malformed ledger: {0}")]
    Malformed(String),
}

/// Ordered record of stage progress for one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StageEntry>", into = "Vec<StageEntry>")]
pub struct StageLedger {
    entries: [StageEntry; Stage::COUNT],
}

impl StageLedger {
    /// Creates a ledger for a freshly received claim
    pub fn new() -> Self {
        let now = Utc::now();
        let mut entries = Stage::ORDER.map(|stage| StageEntry::pending(stage, now));
        entries[Stage::Received.index()].status = StageStatus::Completed;
        entries[Stage::Received.index()].message = "Claim received".to_string();
        Self { entries }
    }

    /// Entry for a stage
    pub fn entry(&self, stage: Stage) -> &StageEntry {
        &self.entries[stage.index()]
    }

    /// Entries in pipeline order
    pub fn entries(&self) -> &[StageEntry] {
        &self.entries
    }

    /// Status of a stage
    pub fn status_of(&self, stage: Stage) -> StageStatus {
        self.entry(stage).status
    }

    /// Marks a stage as in progress
    pub fn start(&mut self, stage: Stage, message: impl Into<String>) -> Result<(), LedgerError> {
        self.ensure_open(stage)?;
        self.ensure_predecessor_completed(stage)?;
        if let Some(active) = self.in_progress() {
            if active != stage {
                return Err(LedgerError::AnotherStageInProgress { stage, active });
            }
        }
        self.entries[stage.index()].set(StageStatus::InProgress, message);
        Ok(())
    }

    /// Marks a stage as completed, optionally attaching a data snapshot
    pub fn complete(
        &mut self,
        stage: Stage,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        self.ensure_open(stage)?;
        self.ensure_predecessor_completed(stage)?;
        if let Some(active) = self.in_progress() {
            if active != stage {
                return Err(LedgerError::AnotherStageInProgress { stage, active });
            }
        }
        let entry = &mut self.entries[stage.index()];
        entry.set(StageStatus::Completed, message);
        entry.data = data;
        Ok(())
    }

    /// Marks a stage as failed
    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) -> Result<(), LedgerError> {
        self.ensure_open(stage)?;
        self.entries[stage.index()].set(StageStatus::Failed, message);
        Ok(())
    }

    /// Returns every stage after `received` to pending
    pub fn reset_for_retry(&mut self) {
        let now = Utc::now();
        for entry in self.entries.iter_mut().skip(1) {
            *entry = StageEntry::pending(entry.stage, now);
            entry.message = "Reset for retry".to_string();
        }
    }

    /// Number of completed stages
    pub fn completed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == StageStatus::Completed)
            .count()
    }

    /// First stage that is not completed, or the last stage when all are
    pub fn current_stage(&self) -> Stage {
        self.first_incomplete().unwrap_or(Stage::NphiesSubmission)
    }

    /// First stage that is not completed
    pub fn first_incomplete(&self) -> Option<Stage> {
        self.entries
            .iter()
            .find(|e| e.status != StageStatus::Completed)
            .map(|e| e.stage)
    }

    /// The stage currently in progress, if any
    pub fn in_progress(&self) -> Option<Stage> {
        self.entries
            .iter()
            .find(|e| e.status == StageStatus::InProgress)
            .map(|e| e.stage)
    }

    /// The first failed stage, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.entries
            .iter()
            .find(|e| e.status == StageStatus::Failed)
            .map(|e| e.stage)
    }

    /// True when every stage is completed
    pub fn is_fully_completed(&self) -> bool {
        self.completed_count() == Stage::COUNT
    }

    /// Verifies ordering and exclusivity over the whole ledger
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let mut seen_incomplete: Option<Stage> = None;
        let mut active: Option<Stage> = None;

        for entry in &self.entries {
            match entry.status {
                StageStatus::Completed | StageStatus::InProgress => {
                    if let Some(blocker) = seen_incomplete {
                        return Err(LedgerError::PredecessorIncomplete {
                            stage: entry.stage,
                            predecessor: blocker,
                        });
                    }
                }
                _ => {}
            }
            if entry.status == StageStatus::InProgress {
                if let Some(first) = active {
                    return Err(LedgerError::AnotherStageInProgress {
                        stage: entry.stage,
                        active: first,
                    });
                }
                active = Some(entry.stage);
            }
            if entry.status != StageStatus::Completed && seen_incomplete.is_none() {
                seen_incomplete = Some(entry.stage);
            }
        }
        Ok(())
    }

    fn ensure_open(&self, stage: Stage) -> Result<(), LedgerError> {
        match self.status_of(stage) {
            StageStatus::Completed => Err(LedgerError::AlreadyCompleted(stage)),
            StageStatus::Failed => Err(LedgerError::AlreadyFailed(stage)),
            _ => Ok(()),
        }
    }

    fn ensure_predecessor_completed(&self, stage: Stage) -> Result<(), LedgerError> {
        match stage.predecessor() {
            Some(predecessor) if self.status_of(predecessor) != StageStatus::Completed => {
                Err(LedgerError::PredecessorIncomplete { stage, predecessor })
            }
            _ => Ok(()),
        }
    }
}

impl Default for StageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<StageEntry>> for StageLedger {
    type Error = LedgerError;

    fn try_from(entries: Vec<StageEntry>) -> Result<Self, Self::Error> {
        let entries: [StageEntry; Stage::COUNT] = entries.try_into().map_err(|v: Vec<_>| {
            LedgerError::Malformed(format!("expected {} entries, got {}", Stage::COUNT, v.len()))
        })?;

        for (entry, expected) in entries.iter().zip(Stage::ORDER) {
            if entry.stage != expected {
                return Err(LedgerError::Malformed(format!(
                    "expected {} at position {}, got {}",
                    expected,
                    expected.index(),
                    entry.stage
                )));
            }
        }

        let ledger = Self { entries };
        ledger.check_invariants()?;
        Ok(ledger)
    }
}

impl From<StageLedger> for Vec<StageEntry> {
    fn from(ledger: StageLedger) -> Self {
        ledger.entries.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ledger_has_received_completed() {
        let ledger = StageLedger::new();
        assert_eq!(ledger.status_of(Stage::Received), StageStatus::Completed);
        for stage in &Stage::ORDER[1..] {
            assert_eq!(ledger.status_of(*stage), StageStatus::Pending);
        }
        assert_eq!(ledger.completed_count(), 1);
        assert_eq!(ledger.current_stage(), Stage::Validation);
    }

    #[test]
    fn test_cannot_skip_a_stage() {
        let mut ledger = StageLedger::new();
        let err = ledger.start(Stage::Normalization, "go").unwrap_err();
        assert_eq!(
            err,
            LedgerError::PredecessorIncomplete {
                stage: Stage::Normalization,
                predecessor: Stage::Validation,
            }
        );
    }

    #[test]
    fn test_only_one_stage_in_progress() {
        let mut ledger = StageLedger::new();
        ledger.start(Stage::Validation, "checking").unwrap();
        let err = ledger
            .complete(Stage::Normalization, "done", None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::PredecessorIncomplete { .. }));

        ledger.complete(Stage::Validation, "ok", None).unwrap();
        ledger.start(Stage::Normalization, "calling").unwrap();
        // restarting the same stage is allowed
        ledger.start(Stage::Normalization, "calling again").unwrap();
        assert_eq!(ledger.in_progress(), Some(Stage::Normalization));
    }

    #[test]
    fn test_completed_stage_is_final() {
        let mut ledger = StageLedger::new();
        ledger.complete(Stage::Validation, "ok", None).unwrap();
        assert_eq!(
            ledger.fail(Stage::Validation, "late"),
            Err(LedgerError::AlreadyCompleted(Stage::Validation))
        );
    }

    #[test]
    fn test_reset_for_retry_keeps_received() {
        let mut ledger = StageLedger::new();
        ledger.complete(Stage::Validation, "ok", None).unwrap();
        ledger.start(Stage::Normalization, "calling").unwrap();
        ledger.fail(Stage::Normalization, "timeout").unwrap();

        ledger.reset_for_retry();

        assert_eq!(ledger.status_of(Stage::Received), StageStatus::Completed);
        for stage in &Stage::ORDER[1..] {
            assert_eq!(ledger.status_of(*stage), StageStatus::Pending);
        }
        assert!(ledger.check_invariants().is_ok());
    }

    #[test]
    fn test_serde_rejects_reordered_entries() {
        let ledger = StageLedger::new();
        let mut entries: Vec<StageEntry> = ledger.into();
        entries.swap(2, 3);
        let json = serde_json::to_string(&entries).unwrap();
        let parsed: Result<StageLedger, _> = serde_json::from_str(&json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(
            serde_json::to_string(&Stage::FinancialRules).unwrap(),
            "\"financialRules\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
