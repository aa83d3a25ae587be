//! API error handling

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use domain_claims::ClaimError;

/// Why a retry was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NotRetryable,
    AlreadyInProgress,
}

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Conflict: {message}")]
    Conflict {
        reason: ConflictReason,
        message: String,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConflictReason>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResponse<'a> {
    error: &'static str,
    validation_errors: &'a [String],
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, reason) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            ApiError::Validation(errors) => {
                let body = ValidationResponse {
                    error: "validation_error",
                    validation_errors: errors,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Conflict { reason, .. } => (StatusCode::CONFLICT, "conflict", Some(*reason)),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict { message: msg, .. } => msg,
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::Validation(_) => String::new(),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            reason,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::NotFound(id) => ApiError::NotFound(format!("Claim {} not found", id)),
            ClaimError::Validation(errors) => ApiError::Validation(errors),
            err @ ClaimError::NotRetryable { .. } => ApiError::Conflict {
                reason: ConflictReason::NotRetryable,
                message: err.to_string(),
            },
            err @ ClaimError::AlreadyInProgress { .. } => ApiError::Conflict {
                reason: ConflictReason::AlreadyInProgress,
                message: err.to_string(),
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<domain_claims::StoreError> for ApiError {
    fn from(err: domain_claims::StoreError) -> Self {
        ApiError::from(ClaimError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::ClaimId;
    use domain_claims::ClaimStatus;

    #[test]
    fn test_retry_conflicts_carry_reason() {
        let id = ClaimId::generate();

        let err = ApiError::from(ClaimError::AlreadyInProgress {
            id: id.clone(),
            status: ClaimStatus::Signing,
        });
        assert!(matches!(
            err,
            ApiError::Conflict { reason: ConflictReason::AlreadyInProgress, .. }
        ));

        let err = ApiError::from(ClaimError::NotRetryable {
            id,
            status: ClaimStatus::Accepted,
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_validation_is_bad_request() {
        let err = ApiError::from(ClaimError::Validation(vec!["claimType is required".into()]));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
