//! Property-Based Test Generators
//!
//! Proptest strategies for submissions and failure scripts, plus
//! `fake`-backed random submissions for load-style tests.

use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use proptest::prelude::*;

use domain_claims::ports::mock::{MockCollaborators, MockFailure, MockStep};
use domain_claims::{ClaimSubmission, ClaimType, SubmissionStatus};

use crate::fixtures::SubmissionFixtures;

/// Strategy for claim types
pub fn claim_type_strategy() -> impl Strategy<Value = ClaimType> {
    prop::sample::select(ClaimType::ALL.to_vec())
}

/// Strategy for gateway outcomes
pub fn submission_status_strategy() -> impl Strategy<Value = SubmissionStatus> {
    prop_oneof![
        Just(SubmissionStatus::Accepted),
        Just(SubmissionStatus::Rejected),
        Just(SubmissionStatus::Submitted),
    ]
}

/// Strategy for injected transport failures
pub fn mock_failure_strategy() -> impl Strategy<Value = MockFailure> {
    prop_oneof![
        Just(MockFailure::Timeout),
        Just(MockFailure::Connection),
        Just(MockFailure::Unavailable),
        Just(MockFailure::BadResponse),
    ]
}

/// Where the direct chain should break, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePlan {
    pub step: Option<MockStep>,
    pub failure: MockFailure,
    pub outcome: SubmissionStatus,
}

impl FailurePlan {
    /// Scripts mock collaborators that follow this plan
    pub fn collaborators(&self) -> MockCollaborators {
        let mocks = MockCollaborators::new().with_bridge_status(self.outcome);
        match self.step {
            Some(step) => mocks.with_failure(step, self.failure),
            None => mocks,
        }
    }
}

/// Strategy for chain failure plans, including the no-failure case
pub fn failure_plan_strategy() -> impl Strategy<Value = FailurePlan> {
    (
        proptest::option::of(prop::sample::select(MockStep::CHAIN.to_vec())),
        mock_failure_strategy(),
        submission_status_strategy(),
    )
        .prop_map(|(step, failure, outcome)| FailurePlan {
            step,
            failure,
            outcome,
        })
}

/// Strategy for plausible non-blank identifiers
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[A-Z0-9]{4,12}"
}

/// Strategy for submissions that pass validation
pub fn valid_submission_strategy() -> impl Strategy<Value = ClaimSubmission> {
    (
        "[A-Za-z][A-Za-z '-]{1,30}",
        identifier_strategy(),
        claim_type_strategy(),
        "[a-z]{1,10}@[a-z]{2,10}\\.(com|sa|test)",
    )
        .prop_map(|(name, patient_id, claim_type, email)| ClaimSubmission {
            patient_name: Some(name),
            patient_id: Some(patient_id),
            claim_type: Some(claim_type.as_str().to_string()),
            user_email: Some(email),
            ..SubmissionFixtures::valid()
        })
}

/// Strategy for claim type strings outside the accepted set
pub fn unknown_claim_type_strategy() -> impl Strategy<Value = String> {
    "[a-z]{3,12}".prop_filter("must not be a known claim type", |s| {
        s.parse::<ClaimType>().is_err()
    })
}

/// Random valid submission built from `fake` data
pub fn fake_submission() -> ClaimSubmission {
    let claim_type = ClaimType::ALL[(0..ClaimType::ALL.len()).fake::<usize>()];
    ClaimSubmission {
        patient_name: Some(Name().fake()),
        patient_id: Some(format!("{}", (1_000_000_000u64..9_999_999_999).fake::<u64>())),
        claim_type: Some(claim_type.as_str().to_string()),
        user_email: Some(SafeEmail().fake()),
        ..SubmissionFixtures::valid()
    }
}
