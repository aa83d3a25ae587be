//! Comprehensive tests for domain_claims

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use core_kernel::{ClaimId, DomainPort, HealthCheckResult, HealthCheckable};

use domain_claims::ports::mock::{MockCollaborators, MockStep, StepBehavior};
use domain_claims::ports::{ClaimPage, ClaimRepository, ListQuery};
use domain_claims::validation::{AttachmentInput, ClaimSubmission, SubmissionValidator};
use domain_claims::{
    status_report, Claim, ClaimError, ClaimIntake, ClaimStatus, InMemoryClaimStore, RetryController,
    Stage, StageStatus, StoreError, SubmissionStatus, WorkflowCoordinator, WorkflowSettings,
};

fn valid_submission() -> ClaimSubmission {
    ClaimSubmission {
        patient_name: Some("Ahmed Al-Rashid".to_string()),
        patient_id: Some("1234567890".to_string()),
        claim_type: Some("professional".to_string()),
        user_email: Some("billing@clinic.test".to_string()),
        ..Default::default()
    }
}

struct Services {
    store: Arc<InMemoryClaimStore>,
    mock: Arc<MockCollaborators>,
    intake: ClaimIntake,
    retry: RetryController,
}

fn services_with(mock: MockCollaborators, allow_rejected_retry: bool) -> Services {
    let store = Arc::new(InMemoryClaimStore::new());
    let mock = Arc::new(mock);
    let coordinator = Arc::new(WorkflowCoordinator::from_settings(
        store.clone(),
        mock.collaborators(false),
        &WorkflowSettings::default(),
        CancellationToken::new(),
    ));
    Services {
        intake: ClaimIntake::new(SubmissionValidator::default(), store.clone(), coordinator.clone()),
        retry: RetryController::new(store.clone(), coordinator, allow_rejected_retry),
        store,
        mock,
    }
}

fn services(mock: MockCollaborators) -> Services {
    services_with(mock, true)
}

async fn submit_and_finish(services: &Services) -> Claim {
    let submitted = services.intake.submit(&valid_submission()).await.unwrap();
    submitted.task.await.unwrap().unwrap()
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_submission_passes() {
        let validated = SubmissionValidator::default().validate(&valid_submission()).unwrap();
        assert_eq!(validated.patient.id, "1234567890");
        assert_eq!(validated.metadata.user_email, "billing@clinic.test");
        assert!(validated.attachment.is_none());
    }

    #[test]
    fn test_missing_claim_type_is_reported() {
        let submission = ClaimSubmission {
            claim_type: None,
            ..valid_submission()
        };
        let errors = SubmissionValidator::default().validate(&submission).unwrap_err();
        assert_eq!(errors, vec!["claimType is required".to_string()]);
    }

    #[test]
    fn test_one_message_per_violated_field() {
        let submission = ClaimSubmission {
            patient_name: None,
            claim_type: Some("dental".to_string()),
            user_email: Some("not-an-email".to_string()),
            ..valid_submission()
        };
        let errors = SubmissionValidator::default().validate(&submission).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "patientName is required".to_string(),
                "claimType must be one of: professional, institutional, pharmacy, vision".to_string(),
                "userEmail must be a valid email address".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_submission_lists_all_required_fields() {
        let errors = SubmissionValidator::default()
            .validate(&ClaimSubmission::default())
            .unwrap_err();
        assert_eq!(errors.len(), 4);
        for field in ["patientName", "patientId", "claimType", "userEmail"] {
            assert!(errors.contains(&format!("{} is required", field)));
        }
    }

    #[test]
    fn test_attachment_limits() {
        let submission = ClaimSubmission {
            attachment: Some(AttachmentInput {
                file_name: None,
                size_bytes: Some(2048),
                ..Default::default()
            }),
            ..valid_submission()
        };
        let errors = SubmissionValidator::new(1024).validate(&submission).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "attachment.fileName is required".to_string(),
                "attachment.sizeBytes exceeds maximum of 1024 bytes".to_string(),
            ]
        );
    }

    #[test]
    fn test_attachment_is_carried_through() {
        let submission = ClaimSubmission {
            attachment: Some(AttachmentInput {
                file_name: Some("invoice.pdf".to_string()),
                content_type: Some("application/pdf".to_string()),
                size_bytes: Some(512),
                reference: None,
            }),
            ..valid_submission()
        };
        let validated = SubmissionValidator::default().validate(&submission).unwrap();
        let attachment = validated.attachment.unwrap();
        assert_eq!(attachment.file_name, "invoice.pdf");
        assert_eq!(attachment.size_bytes, 512);
    }
}

// ============================================================================
// Intake Tests
// ============================================================================

mod intake_tests {
    use super::*;

    #[tokio::test]
    async fn test_submission_is_persisted_and_processed() {
        let services = services(MockCollaborators::new());
        let submitted = services.intake.submit(&valid_submission()).await.unwrap();

        assert_eq!(submitted.claim.status(), ClaimStatus::Received);
        assert_eq!(submitted.claim.version, 1);
        assert!(submitted.claim.id.as_str().starts_with("CLM-"));

        let finished = submitted.task.await.unwrap().unwrap();
        assert_eq!(finished.status(), ClaimStatus::Accepted);

        let stored = services.store.get(&finished.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), ClaimStatus::Accepted);
        assert_eq!(stored.version, finished.version);
    }

    #[tokio::test]
    async fn test_invalid_submission_is_not_persisted() {
        let services = services(MockCollaborators::new());
        let submission = ClaimSubmission {
            claim_type: None,
            ..valid_submission()
        };

        let err = services.intake.submit(&submission).await.unwrap_err();

        match err {
            ClaimError::Validation(errors) => {
                assert!(errors.contains(&"claimType is required".to_string()))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(services.store.is_empty().await);
        assert_eq!(services.mock.calls(MockStep::Normalize), 0);
    }

    /// Reports the first insert as a duplicate id
    struct CollidingStore {
        inner: InMemoryClaimStore,
        collisions_left: Mutex<usize>,
    }

    impl DomainPort for CollidingStore {}

    #[async_trait]
    impl HealthCheckable for CollidingStore {
        async fn health_check(&self) -> HealthCheckResult {
            self.inner.health_check().await
        }
    }

    #[async_trait]
    impl ClaimRepository for CollidingStore {
        async fn insert(&self, claim: Claim) -> Result<Claim, StoreError> {
            let mut left = self.collisions_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Duplicate(claim.id));
            }
            self.inner.insert(claim).await
        }

        async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError> {
            self.inner.get(id).await
        }

        async fn save(&self, claim: &Claim) -> Result<Claim, StoreError> {
            self.inner.save(claim).await
        }

        async fn list(&self, query: &ListQuery) -> Result<ClaimPage, StoreError> {
            self.inner.list(query).await
        }

        async fn sweep(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
            self.inner.sweep(cutoff).await
        }
    }

    fn colliding_intake(collisions: usize) -> ClaimIntake {
        let store = Arc::new(CollidingStore {
            inner: InMemoryClaimStore::new(),
            collisions_left: Mutex::new(collisions),
        });
        let mock = Arc::new(MockCollaborators::new());
        let coordinator = Arc::new(WorkflowCoordinator::from_settings(
            store.clone(),
            mock.collaborators(false),
            &WorkflowSettings::default(),
            CancellationToken::new(),
        ));
        ClaimIntake::new(SubmissionValidator::default(), store, coordinator)
    }

    #[tokio::test]
    async fn test_id_collision_regenerates_id() {
        let intake = colliding_intake(2);
        let submitted = intake.submit(&valid_submission()).await.unwrap();
        assert_eq!(submitted.claim.status(), ClaimStatus::Received);
    }

    #[tokio::test]
    async fn test_id_collisions_give_up_after_three_attempts() {
        let intake = colliding_intake(3);
        let err = intake.submit(&valid_submission()).await.unwrap_err();
        assert!(matches!(err, ClaimError::Store(StoreError::Duplicate(_))));
    }
}

// ============================================================================
// Retry Tests
// ============================================================================

mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_rejected_claim_reenters_pipeline() {
        let services = services(MockCollaborators::new().with_bridge_status(SubmissionStatus::Rejected));
        let rejected = submit_and_finish(&services).await;
        assert_eq!(rejected.status(), ClaimStatus::Rejected);

        services.mock.set_bridge_status(SubmissionStatus::Accepted);
        let accepted = services.retry.retry(&rejected.id).await.unwrap();

        assert_eq!(accepted.claim.status(), ClaimStatus::Received);
        assert_eq!(accepted.claim.retry_count, 1);
        assert!(accepted.claim.errors().is_empty());
        assert!(accepted.claim.submission_status().is_none());
        for stage in &Stage::ORDER[1..] {
            assert_eq!(accepted.claim.ledger().status_of(*stage), StageStatus::Pending);
        }

        let rerun = accepted.task.await.unwrap().unwrap();
        assert_eq!(rerun.status(), ClaimStatus::Accepted);
        assert_eq!(rerun.retry_count, 1);
        assert_eq!(services.mock.calls(MockStep::Submit), 2);
    }

    #[tokio::test]
    async fn test_retry_failed_claim_after_collaborator_recovers() {
        let services = services(
            MockCollaborators::new().with_behavior(
                MockStep::Sign,
                StepBehavior::Fail(domain_claims::ports::mock::MockFailure::Unavailable),
            ),
        );
        let failed = submit_and_finish(&services).await;
        assert_eq!(failed.status(), ClaimStatus::Error);
        assert_eq!(failed.ledger().status_of(Stage::Signing), StageStatus::Failed);

        services.mock.set_behavior(MockStep::Sign, StepBehavior::Succeed);
        let accepted = services.retry.retry(&failed.id).await.unwrap();
        let rerun = accepted.task.await.unwrap().unwrap();

        assert_eq!(rerun.status(), ClaimStatus::Accepted);
        assert!(rerun.errors().is_empty());
    }

    #[tokio::test]
    async fn test_retry_of_in_flight_claim_conflicts() {
        let services = services(
            MockCollaborators::new().with_delay(MockStep::Normalize, Duration::from_millis(200)),
        );
        let submitted = services.intake.submit(&valid_submission()).await.unwrap();

        let err = services.retry.retry(&submitted.claim.id).await.unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyInProgress { .. }));

        let finished = submitted.task.await.unwrap().unwrap();
        assert_eq!(finished.status(), ClaimStatus::Accepted);
    }

    #[tokio::test]
    async fn test_retry_of_accepted_claim_is_refused() {
        let services = services(MockCollaborators::new());
        let accepted = submit_and_finish(&services).await;

        let err = services.retry.retry(&accepted.id).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::NotRetryable {
                status: ClaimStatus::Accepted,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rejected_retry_can_be_disabled() {
        let services = services_with(
            MockCollaborators::new().with_bridge_status(SubmissionStatus::Rejected),
            false,
        );
        let rejected = submit_and_finish(&services).await;

        let err = services.retry.retry(&rejected.id).await.unwrap_err();
        assert!(matches!(err, ClaimError::NotRetryable { .. }));
    }

    #[tokio::test]
    async fn test_retry_unknown_claim() {
        let services = services(MockCollaborators::new());
        let err = services.retry.retry(&ClaimId::generate()).await.unwrap_err();
        assert!(matches!(err, ClaimError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_retries_admit_exactly_one() {
        let services = services(
            MockCollaborators::new().with_behavior(
                MockStep::Normalize,
                StepBehavior::Fail(domain_claims::ports::mock::MockFailure::Timeout),
            ),
        );
        let failed = submit_and_finish(&services).await;
        services.mock.set_behavior(
            MockStep::Normalize,
            StepBehavior::Delay(Duration::from_millis(100)),
        );

        let (first, second) = tokio::join!(
            services.retry.retry(&failed.id),
            services.retry.retry(&failed.id)
        );

        let results = [first, second];
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ClaimError::AlreadyInProgress { .. })))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(conflicts, 1);
    }
}

// ============================================================================
// Status Tests
// ============================================================================

mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_status_report_of_finished_claim() {
        let services = services(MockCollaborators::new());
        let claim = submit_and_finish(&services).await;

        let report = status_report(&claim);
        assert_eq!(report.status, ClaimStatus::Accepted);
        assert!(report.is_complete);
        assert_eq!(report.progress.percentage, 100);
        assert_eq!(report.progress.completed_stages, 6);
        assert_eq!(report.progress.current_stage, Stage::NphiesSubmission);
        assert_eq!(report.stages.financial_rules.label, "Financial Rules");
    }

    #[tokio::test]
    async fn test_status_report_is_idempotent() {
        let services = services(MockCollaborators::new());
        let claim = submit_and_finish(&services).await;

        let first = status_report(&services.store.get(&claim.id).await.unwrap().unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = status_report(&services.store.get(&claim.id).await.unwrap().unwrap());

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_status_report_of_failed_claim() {
        let services = services(
            MockCollaborators::new().with_behavior(
                MockStep::ApplyRules,
                StepBehavior::Fail(domain_claims::ports::mock::MockFailure::Connection),
            ),
        );
        let claim = submit_and_finish(&services).await;

        let report = status_report(&claim);
        assert_eq!(report.status, ClaimStatus::Error);
        assert!(report.is_complete);
        assert_eq!(report.progress.completed_stages, 3);
        assert_eq!(report.progress.percentage, 50);
        assert_eq!(report.progress.current_stage, Stage::FinancialRules);
        assert_eq!(report.stages.financial_rules.status, StageStatus::Failed);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, "connection");
    }
}
