//! Collaborator adapters against a local stub server

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use core_kernel::{ClaimId, OperationMetadata, PortError};
use domain_claims::adapters::{
    build_client, BridgeClient, NormalizerClient, OrchestratorClient, RulesEngineClient, SignerClient,
    CORRELATION_HEADER,
};
use domain_claims::ports::{
    BridgePort, CallContext, NormalizeRequest, NormalizerPort, OrchestrationRequest, OrchestratorPort,
    PricingRequest, RulesEnginePort, SignRequest, SignerPort, SubmitRequest,
};
use domain_claims::{ClaimType, SubmissionStatus};

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn ctx(timeout: Duration) -> CallContext {
    CallContext {
        metadata: OperationMetadata::with_correlation_id("CLM-TEST-ABC123"),
        cancel: CancellationToken::new(),
        timeout,
    }
}

fn normalize_request() -> NormalizeRequest {
    NormalizeRequest {
        facility_id: "FAC-1".to_string(),
        internal_code: "99213".to_string(),
        description: "Office visit".to_string(),
    }
}

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_normalizer_round_trip_carries_correlation_id() {
    let router = Router::new().route(
        "/normalize",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let correlation = headers
                .get(CORRELATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Json(json!({
                "sbs_mapped_code": format!("SBS-{}", body["internal_code"].as_str().unwrap_or("")),
                "confidence": 0.87,
                "official_description": correlation,
            }))
        }),
    );
    let base = spawn_stub(router).await;
    let normalizer = NormalizerClient::new(client(), base);

    let normalized = normalizer
        .normalize(&normalize_request(), &ctx(Duration::from_secs(2)))
        .await
        .unwrap();

    assert_eq!(normalized.sbs_mapped_code, "SBS-99213");
    assert_eq!(normalized.official_description.as_deref(), Some("CLM-TEST-ABC123"));
}

#[tokio::test]
async fn test_rules_engine_keeps_unknown_fields() {
    let router = Router::new().route(
        "/validate",
        post(|| async {
            Json(json!({
                "total": { "value": 172.5, "currency": "SAR" },
                "net_amount": "150.00",
                "markup_percent": 15,
                "line_items": [{ "code": "SBS-1" }]
            }))
        }),
    );
    let base = spawn_stub(router).await;
    let rules = RulesEngineClient::new(client(), format!("{}/", base));

    let request = PricingRequest {
        facility_id: "FAC-1".to_string(),
        claim_id: ClaimId::generate(),
        claim_type: ClaimType::Professional,
        patient_id: "P-1".to_string(),
        member_id: None,
        payer_id: None,
        sbs_code: "SBS-1".to_string(),
        description: "Office visit".to_string(),
        confidence: 0.9,
    };
    let priced = rules.apply_rules(&request, &ctx(Duration::from_secs(2))).await.unwrap();

    assert_eq!(priced.total.value, dec!(172.5));
    assert_eq!(priced.net_amount, Some(dec!(150.00)));
    assert_eq!(priced.markup_percent, Some(dec!(15)));
    assert!(priced.extra.contains_key("line_items"));
}

#[tokio::test]
async fn test_signer_and_bridge_contracts() {
    let router = Router::new()
        .route(
            "/sign",
            post(|| async { Json(json!({ "signature": "c2ln", "algorithm": "RS256" })) }),
        )
        .route(
            "/submit-claim",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["signature"], "c2ln");
                Json(json!({ "transaction_id": "TXN-9", "status": "rejected" }))
            }),
        );
    let base = spawn_stub(router).await;
    let http = client();
    let signer = SignerClient::new(http.clone(), base.clone());
    let bridge = BridgeClient::new(http, base);
    let call = ctx(Duration::from_secs(2));

    let signed = signer
        .sign(
            &SignRequest {
                payload: json!({ "total": { "value": "1.00" } }),
                facility_id: "FAC-1".to_string(),
            },
            &call,
        )
        .await
        .unwrap();
    let receipt = bridge
        .submit(
            &SubmitRequest {
                payload: json!({}),
                signature: signed.signature,
                facility_id: "FAC-1".to_string(),
            },
            &call,
        )
        .await
        .unwrap();

    assert_eq!(receipt.transaction_id, "TXN-9");
    assert_eq!(receipt.status, SubmissionStatus::Rejected);
}

#[tokio::test]
async fn test_orchestrator_posts_to_configured_url() {
    let router = Router::new().route(
        "/webhook/claims",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "claimId": body["claimId"],
                "submissionId": "SUB-1",
                "trackingUrl": null,
                "status": "queued"
            }))
        }),
    );
    let base = spawn_stub(router).await;
    let orchestrator = OrchestratorClient::new(client(), format!("{}/webhook/claims", base));
    let claim_id = ClaimId::generate();

    let request = OrchestrationRequest {
        claim_id: claim_id.clone(),
        patient_name: "Ahmed".to_string(),
        patient_id: "P-1".to_string(),
        claim_type: ClaimType::Pharmacy,
        user_email: "a@b.test".to_string(),
        member_id: None,
        payer_id: None,
        provider_id: None,
        facility_id: "FAC-1".to_string(),
        service_code: None,
        service_description: None,
        attachment: None,
        submitted_at: chrono::Utc::now(),
    };
    let receipt = orchestrator
        .start_workflow(&request, &ctx(Duration::from_secs(2)))
        .await
        .unwrap();

    assert_eq!(receipt.claim_id.as_deref(), Some(claim_id.as_str()));
    assert_eq!(receipt.status, "queued");
}

#[tokio::test]
async fn test_http_status_mapping() {
    let router = Router::new()
        .route("/unavailable/normalize", post(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/forbidden/normalize", post(|| async { StatusCode::FORBIDDEN }))
        .route(
            "/limited/normalize",
            post(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("retry-after", "7".parse().unwrap());
                (StatusCode::TOO_MANY_REQUESTS, headers).into_response()
            }),
        )
        .route("/garbled/normalize", post(|| async { "not json" }));
    let base = spawn_stub(router).await;
    let call = ctx(Duration::from_secs(2));
    let normalize = |prefix: &str| NormalizerClient::new(client(), format!("{}/{}", base, prefix));

    let err = normalize("unavailable").normalize(&normalize_request(), &call).await.unwrap_err();
    assert!(matches!(err, PortError::ServiceUnavailable { .. }));

    let err = normalize("forbidden").normalize(&normalize_request(), &call).await.unwrap_err();
    assert!(matches!(err, PortError::Unauthorized { .. }));

    let err = normalize("limited").normalize(&normalize_request(), &call).await.unwrap_err();
    assert!(matches!(err, PortError::RateLimited { retry_after_secs: 7 }));

    let err = normalize("missing").normalize(&normalize_request(), &call).await.unwrap_err();
    assert!(err.is_not_found());

    let err = normalize("garbled").normalize(&normalize_request(), &call).await.unwrap_err();
    assert!(matches!(err, PortError::Transformation { .. }));
}

#[tokio::test]
async fn test_slow_collaborator_times_out() {
    let router = Router::new().route(
        "/normalize",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({}))
        }),
    );
    let base = spawn_stub(router).await;
    let normalizer = NormalizerClient::new(client(), base);

    let err = normalizer
        .normalize(&normalize_request(), &ctx(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_unreachable_collaborator_is_a_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let normalizer = NormalizerClient::new(client(), format!("http://{}", addr));
    let err = normalizer
        .normalize(&normalize_request(), &ctx(Duration::from_secs(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, PortError::Connection { .. }));
}

#[tokio::test]
async fn test_cancelled_call_returns_promptly() {
    let router = Router::new().route(
        "/normalize",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({}))
        }),
    );
    let base = spawn_stub(router).await;
    let normalizer = NormalizerClient::new(client(), base);
    let call = ctx(Duration::from_secs(10));
    let cancel = call.cancel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        normalizer.normalize(&normalize_request(), &call),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.kind(), "cancelled");
}
