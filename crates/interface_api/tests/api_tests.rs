//! HTTP-level tests of the claims API against mock collaborators

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use domain_claims::ports::mock::{MockCollaborators, MockFailure, MockStep};
use domain_claims::{InMemoryClaimStore, SubmissionStatus};
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

struct TestApp {
    server: TestServer,
    mocks: Arc<MockCollaborators>,
}

fn app_with(mocks: MockCollaborators, config: ApiConfig) -> TestApp {
    let mocks = Arc::new(mocks);
    let state = AppState::new(
        config,
        Arc::new(InMemoryClaimStore::new()),
        mocks.collaborators(false),
        CancellationToken::new(),
    );
    let server = TestServer::new(create_router(state)).unwrap();
    TestApp { server, mocks }
}

fn app(mocks: MockCollaborators) -> TestApp {
    app_with(mocks, ApiConfig::default())
}

fn valid_submission() -> Value {
    json!({
        "patientName": "Ahmed Al-Harbi",
        "patientId": "1029384756",
        "claimType": "professional",
        "userEmail": "billing@clinic.test",
        "facilityId": "FAC-7",
        "serviceCode": "99213"
    })
}

async fn submit(app: &TestApp) -> String {
    let response = app.server.post("/api/v1/claims").json(&valid_submission()).await;
    response.assert_status(StatusCode::ACCEPTED);
    response.json::<Value>()["claimId"].as_str().unwrap().to_string()
}

/// Polls the status endpoint until the claim reaches a final state
async fn wait_until_complete(app: &TestApp, claim_id: &str) -> Value {
    for _ in 0..200 {
        let status = app
            .server
            .get(&format!("/api/v1/claims/{}/status", claim_id))
            .await
            .json::<Value>();
        if status["isComplete"] == json!(true) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("claim {} never completed", claim_id);
}

#[tokio::test]
async fn test_submit_returns_processing_with_tracking_url() {
    let app = app(MockCollaborators::new());

    let response = app.server.post("/api/v1/claims").json(&valid_submission()).await;

    response.assert_status(StatusCode::ACCEPTED);
    let body = response.json::<Value>();
    let claim_id = body["claimId"].as_str().unwrap();
    assert!(claim_id.starts_with("CLM-"));
    assert_eq!(body["status"], "processing");
    assert_eq!(
        body["trackingUrl"],
        format!("http://localhost:8080/api/v1/claims/{}/status", claim_id)
    );
}

#[tokio::test]
async fn test_submitted_claim_runs_to_acceptance() {
    let app = app(MockCollaborators::new());
    let claim_id = submit(&app).await;

    let status = wait_until_complete(&app, &claim_id).await;

    assert_eq!(status["status"], "accepted");
    assert_eq!(status["progress"]["percentage"], 100);
    assert_eq!(status["progress"]["completedStages"], 6);
    assert_eq!(status["stages"]["nphiesSubmission"]["status"], "completed");
    assert_eq!(status["errors"], json!([]));
    assert_eq!(app.mocks.calls(MockStep::Submit), 1);
}

#[tokio::test]
async fn test_missing_claim_type_is_rejected_before_persisting() {
    let app = app(MockCollaborators::new());
    let mut body = valid_submission();
    body.as_object_mut().unwrap().remove("claimType");

    let response = app.server.post("/api/v1/claims").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let errors = response.json::<Value>()["validationErrors"].clone();
    assert_eq!(errors, json!(["claimType is required"]));

    let list = app.server.get("/api/v1/claims").await.json::<Value>();
    assert_eq!(list["pagination"]["total"], 0);
    assert_eq!(app.mocks.calls(MockStep::Normalize), 0);
}

#[tokio::test]
async fn test_every_violation_is_reported() {
    let app = app(MockCollaborators::new());

    let response = app
        .server
        .post("/api/v1/claims")
        .json(&json!({ "patientName": " ", "claimType": "dental", "userEmail": "nope" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let errors = response.json::<Value>()["validationErrors"].clone();
    assert_eq!(
        errors,
        json!([
            "patientName is required",
            "patientId is required",
            "claimType must be one of: professional, institutional, pharmacy, vision",
            "userEmail must be a valid email address"
        ])
    );
}

#[tokio::test]
async fn test_wrong_field_types_are_validation_errors() {
    let app = app(MockCollaborators::new());

    let response = app
        .server
        .post("/api/v1/claims")
        .json(&json!({
            "patientName": "Ahmed Al-Harbi",
            "patientId": "1029384756",
            "claimType": 7,
            "userEmail": "nope",
            "serviceCode": ["99213"]
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(
        body["validationErrors"],
        json!([
            "claimType must be one of: professional, institutional, pharmacy, vision",
            "userEmail must be a valid email address",
            "serviceCode must be a string"
        ])
    );

    let list = app.server.get("/api/v1/claims").await.json::<Value>();
    assert_eq!(list["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app(MockCollaborators::new());

    let response = app
        .server
        .post("/api/v1/claims")
        .text("{not json")
        .content_type("application/json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "bad_request");
}

#[tokio::test]
async fn test_status_lookup_errors() {
    let app = app(MockCollaborators::new());

    app.server
        .get("/api/v1/claims/not-a-claim/status")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    app.server
        .get("/api/v1/claims/CLM-LZ0000-ABCDEF/status")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_normalizer_failure_is_visible_in_status() {
    let app = app(MockCollaborators::new().with_failure(MockStep::Normalize, MockFailure::Timeout));
    let claim_id = submit(&app).await;

    let status = wait_until_complete(&app, &claim_id).await;

    assert_eq!(status["status"], "error");
    assert_eq!(status["stages"]["normalization"]["status"], "failed");
    assert_eq!(status["stages"]["financialRules"]["status"], "pending");
    assert_eq!(status["errors"][0]["stage"], "normalization");
    assert_eq!(status["errors"][0]["code"], "timeout");
}

#[tokio::test]
async fn test_retry_rejected_claim_reenters_pipeline() {
    let app = app(MockCollaborators::new().with_bridge_status(SubmissionStatus::Rejected));
    let claim_id = submit(&app).await;

    let status = wait_until_complete(&app, &claim_id).await;
    assert_eq!(status["status"], "rejected");
    assert_eq!(status["stages"]["nphiesSubmission"]["status"], "completed");

    app.mocks.set_bridge_status(SubmissionStatus::Accepted);
    let response = app
        .server
        .post(&format!("/api/v1/claims/{}/retry", claim_id))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "received");
    assert_eq!(body["retryCount"], 1);

    let status = wait_until_complete(&app, &claim_id).await;
    assert_eq!(status["status"], "accepted");
    assert_eq!(app.mocks.calls(MockStep::Submit), 2);
}

#[tokio::test]
async fn test_retry_of_processing_claim_conflicts() {
    let app = app(MockCollaborators::new().with_delay(MockStep::Normalize, Duration::from_millis(300)));
    let claim_id = submit(&app).await;

    let response = app
        .server
        .post(&format!("/api/v1/claims/{}/retry", claim_id))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["reason"], "already_in_progress");
}

#[tokio::test]
async fn test_retry_of_accepted_claim_is_not_retryable() {
    let app = app(MockCollaborators::new());
    let claim_id = submit(&app).await;
    wait_until_complete(&app, &claim_id).await;

    let response = app
        .server
        .post(&format!("/api/v1/claims/{}/retry", claim_id))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["reason"], "not_retryable");
}

#[tokio::test]
async fn test_rejected_retry_can_be_disabled() {
    let config = ApiConfig {
        allow_rejected_retry: false,
        ..ApiConfig::default()
    };
    let app = app_with(
        MockCollaborators::new().with_bridge_status(SubmissionStatus::Rejected),
        config,
    );
    let claim_id = submit(&app).await;
    wait_until_complete(&app, &claim_id).await;

    let response = app
        .server
        .post(&format!("/api/v1/claims/{}/retry", claim_id))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["reason"], "not_retryable");
}

#[tokio::test]
async fn test_retry_unknown_claim_is_not_found() {
    let app = app(MockCollaborators::new());

    app.server
        .post("/api/v1/claims/CLM-LZ0000-ABCDEF/retry")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_is_paginated_and_filterable() {
    let app = app(MockCollaborators::new());
    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = submit(&app).await;
        wait_until_complete(&app, &id).await;
        ids.push(id);
    }

    let page = app
        .server
        .get("/api/v1/claims")
        .add_query_param("page", 1)
        .add_query_param("limit", 2)
        .await;
    page.assert_status_ok();
    let page = page.json::<Value>();
    assert_eq!(page["claims"].as_array().unwrap().len(), 2);
    assert_eq!(
        page["pagination"],
        json!({ "page": 1, "limit": 2, "total": 3, "totalPages": 2 })
    );

    let accepted = app
        .server
        .get("/api/v1/claims")
        .add_query_param("status", "accepted")
        .await
        .json::<Value>();
    assert_eq!(accepted["pagination"]["total"], 3);

    let errored = app
        .server
        .get("/api/v1/claims")
        .add_query_param("status", "error")
        .await
        .json::<Value>();
    assert_eq!(errored["pagination"]["total"], 0);

    app.server
        .get("/api/v1/claims")
        .add_query_param("status", "bogus")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_page_far_past_the_end_is_empty() {
    let app = app(MockCollaborators::new());
    submit(&app).await;

    let response = app
        .server
        .get("/api/v1/claims")
        .add_query_param("page", usize::MAX)
        .add_query_param("limit", 100)
        .await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["claims"], json!([]));
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["totalPages"], 1);
}

#[tokio::test]
async fn test_claim_detail_returns_full_record() {
    let app = app(MockCollaborators::new());
    let claim_id = submit(&app).await;
    wait_until_complete(&app, &claim_id).await;

    let response = app.server.get(&format!("/api/v1/claims/{}", claim_id)).await;

    response.assert_status_ok();
    let claim = response.json::<Value>();
    assert_eq!(claim["id"], claim_id.as_str());
    assert_eq!(claim["patient"]["id"], "1029384756");
    assert_eq!(claim["executionPath"], "fallback_chain");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = app(MockCollaborators::new());

    let live = app.server.get("/health").await;
    live.assert_status_ok();
    assert_eq!(live.json::<Value>()["status"], "healthy");

    let ready = app.server.get("/health/ready").await;
    ready.assert_status_ok();
    let ready = ready.json::<Value>();
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["store"]["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_generated_and_propagated() {
    let app = app(MockCollaborators::new());

    let generated = app.server.get("/health").await;
    let id = generated.header(REQUEST_ID);
    assert!(!id.to_str().unwrap().is_empty());

    let echoed = app
        .server
        .get("/health")
        .add_header(REQUEST_ID, HeaderValue::from_static("req-123"))
        .await;
    assert_eq!(echoed.header(REQUEST_ID).to_str().unwrap(), "req-123");
}
