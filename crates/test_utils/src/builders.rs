//! Test Data Builders
//!
//! Builder patterns for claims at any point of the pipeline. Tests specify
//! only what matters to them; everything else comes from the fixtures.
//!
//! ```rust,ignore
//! let claim = TestClaimBuilder::new()
//!     .with_claim_type(ClaimType::Pharmacy)
//!     .completed_through(Stage::FinancialRules)
//!     .build();
//! assert_eq!(claim.status(), ClaimStatus::RulesApplied);
//! ```

use chrono::{DateTime, Utc};
use serde_json::json;

use core_kernel::{ClaimId, PortError};
use domain_claims::{
    AttachmentDescriptor, Claim, ClaimSubmission, ClaimType, ErrorEntry, PatientRef, Stage,
    SubmissionMetadata, SubmissionStatus,
};

use crate::fixtures::{ClaimFixtures, SubmissionFixtures};

/// Where the built claim's ledger should stand
#[derive(Debug)]
enum LedgerTarget {
    /// Only `received` completed
    Received,
    /// Every stage up to and including the given one completed
    CompletedThrough(Stage),
    /// Stages before the given one completed, the given one in progress
    InFlight(Stage),
    /// Stages before the given one completed, the given one failed
    FailedAt(Stage, PortError),
    /// All stages completed with a gateway outcome
    Finished(SubmissionStatus),
}

/// Builder for constructing test claims
pub struct TestClaimBuilder {
    id: ClaimId,
    patient: PatientRef,
    claim_type: ClaimType,
    metadata: SubmissionMetadata,
    attachment: Option<AttachmentDescriptor>,
    created_at: Option<DateTime<Utc>>,
    target: LedgerTarget,
}

impl Default for TestClaimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClaimBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            id: ClaimId::generate(),
            patient: ClaimFixtures::patient(),
            claim_type: ClaimFixtures::claim_type(),
            metadata: ClaimFixtures::metadata(),
            attachment: None,
            created_at: None,
            target: LedgerTarget::Received,
        }
    }

    pub fn with_id(mut self, id: ClaimId) -> Self {
        self.id = id;
        self
    }

    pub fn with_patient(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.patient = PatientRef {
            name: name.into(),
            id: id.into(),
        };
        self
    }

    pub fn with_claim_type(mut self, claim_type: ClaimType) -> Self {
        self.claim_type = claim_type;
        self
    }

    pub fn with_facility(mut self, facility_id: impl Into<String>) -> Self {
        self.metadata.facility_id = Some(facility_id.into());
        self
    }

    pub fn with_attachment(mut self) -> Self {
        self.attachment = Some(ClaimFixtures::attachment());
        self
    }

    /// Backdates creation, e.g. to exercise the retention sweep
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Completes every stage up to and including `stage`
    pub fn completed_through(mut self, stage: Stage) -> Self {
        self.target = LedgerTarget::CompletedThrough(stage);
        self
    }

    /// Leaves `stage` in progress
    pub fn in_flight_at(mut self, stage: Stage) -> Self {
        self.target = LedgerTarget::InFlight(stage);
        self
    }

    /// Fails `stage` with a transport error
    pub fn failed_at(mut self, stage: Stage, error: PortError) -> Self {
        self.target = LedgerTarget::FailedAt(stage, error);
        self
    }

    /// Completes the pipeline with the given gateway outcome
    pub fn finished(mut self, outcome: SubmissionStatus) -> Self {
        self.target = LedgerTarget::Finished(outcome);
        self
    }

    /// Builds the claim
    ///
    /// # Panics
    ///
    /// Panics if the requested progress cannot be expressed on a ledger,
    /// e.g. `in_flight_at(Stage::Received)`.
    pub fn build(self) -> Claim {
        let mut claim = Claim::receive(
            self.id,
            self.patient,
            self.claim_type,
            self.metadata,
            self.attachment,
        );

        match self.target {
            LedgerTarget::Received => {}
            LedgerTarget::CompletedThrough(stage) => complete_before(&mut claim, next_after(stage)),
            LedgerTarget::InFlight(stage) => {
                complete_before(&mut claim, Some(stage));
                claim
                    .start_stage(stage, format!("{} in progress", stage.label()))
                    .expect("stage can start");
            }
            LedgerTarget::FailedAt(stage, error) => {
                complete_before(&mut claim, Some(stage));
                claim
                    .start_stage(stage, format!("{} in progress", stage.label()))
                    .expect("stage can start");
                claim.fail_in_flight(ErrorEntry::transport(stage, &error));
            }
            LedgerTarget::Finished(outcome) => {
                complete_before(&mut claim, None);
                claim.record_outcome(
                    outcome,
                    json!({ "transaction_id": "TXN-TEST", "status": outcome.as_str() }),
                );
            }
        }

        if let Some(created_at) = self.created_at {
            claim.created_at = created_at;
        }
        claim
    }
}

fn next_after(stage: Stage) -> Option<Stage> {
    Stage::ORDER.get(stage.index() + 1).copied()
}

/// Completes every stage strictly before `until` (all stages when `None`)
fn complete_before(claim: &mut Claim, until: Option<Stage>) {
    for stage in Stage::ORDER.into_iter().skip(1) {
        if Some(stage) == until {
            break;
        }
        claim
            .complete_stage(stage, format!("{} completed", stage.label()), None)
            .expect("stage can complete");
    }
}

/// Builder for submission payloads
pub struct TestSubmissionBuilder {
    submission: ClaimSubmission,
}

impl Default for TestSubmissionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSubmissionBuilder {
    /// Starts from a valid submission
    pub fn new() -> Self {
        Self {
            submission: SubmissionFixtures::valid(),
        }
    }

    pub fn claim_type(mut self, claim_type: Option<&str>) -> Self {
        self.submission.claim_type = claim_type.map(str::to_string);
        self
    }

    pub fn user_email(mut self, email: Option<&str>) -> Self {
        self.submission.user_email = email.map(str::to_string);
        self
    }

    pub fn patient(mut self, name: Option<&str>, id: Option<&str>) -> Self {
        self.submission.patient_name = name.map(str::to_string);
        self.submission.patient_id = id.map(str::to_string);
        self
    }

    pub fn service(mut self, code: Option<&str>, description: Option<&str>) -> Self {
        self.submission.service_code = code.map(str::to_string);
        self.submission.service_description = description.map(str::to_string);
        self
    }

    pub fn build(self) -> ClaimSubmission {
        self.submission
    }
}
