//! Custom Test Assertions
//!
//! Assertion helpers for claims and ledgers that give more meaningful error
//! messages than standard assertions.

use domain_claims::{progress, Claim, ClaimStatus, Stage, StageStatus};

/// Asserts the ledger ordering and exclusivity rules hold
///
/// # Panics
///
/// Panics with the violated rule and the full ledger
pub fn assert_ledger_invariants(claim: &Claim) {
    if let Err(e) = claim.ledger().check_invariants() {
        panic!(
            "Ledger invariant violated for {}: {}\nledger: {:#?}",
            claim.id,
            e,
            claim.ledger().entries()
        );
    }
    assert_eq!(
        claim.status(),
        ClaimStatus::derive(claim.ledger(), claim.submission_status()),
        "Stored status of {} disagrees with its ledger",
        claim.id
    );
}

/// Asserts the status of a single stage
pub fn assert_stage_status(claim: &Claim, stage: Stage, expected: StageStatus) {
    let actual = claim.ledger().status_of(stage);
    assert_eq!(
        actual, expected,
        "Stage {} of {}: expected {}, got {} ({})",
        stage.name(),
        claim.id,
        expected.as_str(),
        actual.as_str(),
        claim.ledger().entry(stage).message
    );
}

/// Asserts the claim stopped with `stage` failed and nothing after it touched
pub fn assert_failed_at(claim: &Claim, stage: Stage) {
    assert_eq!(claim.status(), ClaimStatus::Error, "Claim {} is not in error", claim.id);
    for other in Stage::ORDER {
        let expected = match other.cmp(&stage) {
            std::cmp::Ordering::Less => StageStatus::Completed,
            std::cmp::Ordering::Equal => StageStatus::Failed,
            std::cmp::Ordering::Greater => StageStatus::Pending,
        };
        assert_stage_status(claim, other, expected);
    }
    assert!(
        claim.errors().iter().any(|e| e.stage == Some(stage)),
        "No error entry recorded for stage {} of {}",
        stage.name(),
        claim.id
    );
}

/// Asserts the claim is back in its freshly received shape after a retry
pub fn assert_clean_retry_state(claim: &Claim) {
    assert_eq!(claim.status(), ClaimStatus::Received);
    assert_stage_status(claim, Stage::Received, StageStatus::Completed);
    for stage in Stage::ORDER.into_iter().skip(1) {
        assert_stage_status(claim, stage, StageStatus::Pending);
    }
    assert!(claim.errors().is_empty(), "Error log not cleared: {:?}", claim.errors());
    assert!(claim.submission_status().is_none());
    assert!(claim.external_response.is_none());
}

/// Asserts progress never moves backwards across observed snapshots
///
/// Valid for runs without a retry in between.
pub fn assert_progress_monotonic(snapshots: &[Claim]) {
    for pair in snapshots.windows(2) {
        let before = progress(&pair[0]);
        let after = progress(&pair[1]);
        assert!(
            after.completed_stages >= before.completed_stages,
            "Progress of {} went backwards: {} -> {} completed stages",
            pair[1].id,
            before.completed_stages,
            after.completed_stages
        );
        assert!(
            after.current_stage >= before.current_stage,
            "Current stage of {} went backwards: {:?} -> {:?}",
            pair[1].id,
            before.current_stage,
            after.current_stage
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::TestClaimBuilder;
    use core_kernel::PortError;

    #[test]
    fn test_failed_claim_assertions() {
        let claim = TestClaimBuilder::new()
            .failed_at(Stage::Signing, PortError::unavailable("signer"))
            .build();
        assert_ledger_invariants(&claim);
        assert_failed_at(&claim, Stage::Signing);
    }

    #[test]
    fn test_retry_reset_assertion() {
        let mut claim = TestClaimBuilder::new()
            .failed_at(Stage::Normalization, PortError::timeout("normalize", 10))
            .build();
        claim.reset_for_retry();
        assert_clean_retry_state(&claim);
    }

    #[test]
    #[should_panic(expected = "went backwards")]
    fn test_monotonicity_detects_regression() {
        let later = TestClaimBuilder::new().completed_through(Stage::Signing).build();
        let earlier = TestClaimBuilder::new().completed_through(Stage::Validation).build();
        assert_progress_monotonic(&[later, earlier]);
    }
}
