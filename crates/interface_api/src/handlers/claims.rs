//! Claims handlers

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use core_kernel::ClaimId;
use domain_claims::{
    status_report, Claim, ClaimRepository, ClaimStatus, ClaimStatusReport, ClaimSubmission, ListQuery,
};

use crate::dto::claims::*;
use crate::{error::ApiError, AppState};

fn parse_claim_id(raw: &str) -> Result<ClaimId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid claim id '{}': {}", raw, e)))
}

async fn load_claim(state: &AppState, raw_id: &str) -> Result<Claim, ApiError> {
    let id = parse_claim_id(raw_id)?;
    state
        .repository
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Claim {} not found", id)))
}

/// Accepts a claim submission and schedules its first run
pub async fn submit_claim(
    State(state): State<AppState>,
    payload: Result<Json<ClaimSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitClaimResponse>), ApiError> {
    let Json(submission) = payload?;
    let submitted = state.intake.submit(&submission).await?;
    let claim_id = submitted.claim.id;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitClaimResponse {
            tracking_url: state.config.tracking_url(&claim_id),
            claim_id,
            status: ClaimStatus::Processing.as_str(),
        }),
    ))
}

/// Current status, per-stage ledger and progress of a claim
pub async fn get_claim_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClaimStatusReport>, ApiError> {
    let claim = load_claim(&state, &id).await?;
    Ok(Json(status_report(&claim)))
}

/// Full claim record
pub async fn get_claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Claim>, ApiError> {
    load_claim(&state, &id).await.map(Json)
}

/// Resets a failed or rejected claim and runs it again
pub async fn retry_claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RetryClaimResponse>), ApiError> {
    let id = parse_claim_id(&id)?;
    let accepted = state.retry.retry(&id).await?;
    let claim = accepted.claim;

    info!(claim_id = %claim.id, retry_count = claim.retry_count, "Retry scheduled");

    Ok((
        StatusCode::ACCEPTED,
        Json(RetryClaimResponse {
            tracking_url: state.config.tracking_url(&claim.id),
            status: claim.status(),
            retry_count: claim.retry_count,
            claim_id: claim.id,
        }),
    ))
}

/// Lists claims, newest first
pub async fn list_claims(
    State(state): State<AppState>,
    params: Result<Query<ListClaimsParams>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<ClaimListResponse>, ApiError> {
    let Query(params) = params?;

    let status = params
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse::<ClaimStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown status filter '{}'", s)))
        })
        .transpose()?;

    let defaults = ListQuery::default();
    let query = ListQuery {
        page: params.page.unwrap_or(defaults.page).max(1),
        limit: params.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        status,
    };

    let page = state.repository.list(&query).await?;

    Ok(Json(ClaimListResponse {
        claims: page.items.iter().map(ClaimSummary::from).collect(),
        pagination: Pagination::new(query.page, query.limit, page.total),
    }))
}
