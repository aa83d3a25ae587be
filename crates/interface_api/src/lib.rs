//! HTTP API Layer
//!
//! This crate provides the REST API of the claims orchestrator using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: claim submission, status polling, retry, listing, health
//! - **Middleware**: request ids, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(config, repository, collaborators, shutdown);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_claims::{
    ClaimIntake, ClaimRepository, Collaborators, RetryController, SubmissionValidator,
    WorkflowCoordinator,
};

use crate::config::ApiConfig;
use crate::handlers::{claims, health};
use crate::middleware::{audit_middleware, MakeRequestUuidV7};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub intake: ClaimIntake,
    pub retry: RetryController,
    pub repository: Arc<dyn ClaimRepository>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires intake, coordinator and retry controller around one store
    ///
    /// `shutdown` is the root token: cancelling it aborts in-flight remote
    /// calls of every run.
    pub fn new(
        config: ApiConfig,
        repository: Arc<dyn ClaimRepository>,
        collaborators: Collaborators,
        shutdown: CancellationToken,
    ) -> Self {
        let coordinator = Arc::new(WorkflowCoordinator::from_settings(
            Arc::clone(&repository),
            collaborators,
            &config.workflow_settings(),
            shutdown,
        ));

        let intake = ClaimIntake::new(
            SubmissionValidator::new(config.max_attachment_bytes),
            Arc::clone(&repository),
            Arc::clone(&coordinator),
        );
        let retry = RetryController::new(
            Arc::clone(&repository),
            coordinator,
            config.allow_rejected_retry,
        );

        Self {
            intake,
            retry,
            repository,
            config,
        }
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Wired application state
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Claims routes
    let claims_routes = Router::new()
        .route("/", post(claims::submit_claim).get(claims::list_claims))
        .route("/:id", get(claims::get_claim))
        .route("/:id/status", get(claims::get_claim_status))
        .route("/:id/retry", post(claims::retry_claim));

    let api_routes = Router::new()
        .nest("/claims", claims_routes)
        .layer(axum_middleware::from_fn(audit_middleware));

    let cors = if state.config.cors_allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
        .with_state(state)
}
