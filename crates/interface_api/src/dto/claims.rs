//! Claims DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::ClaimId;
use domain_claims::{progress, Claim, ClaimStatus, ClaimType, ExecutionPathKind, Stage};

/// Largest page a client may request
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitClaimResponse {
    pub claim_id: ClaimId,
    /// Always `processing`: the run has been scheduled
    pub status: &'static str,
    pub tracking_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryClaimResponse {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub retry_count: u32,
    pub tracking_url: String,
}

/// Query string of the list endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListClaimsParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSummary {
    pub claim_id: ClaimId,
    pub patient_name: String,
    pub patient_id: String,
    pub claim_type: ClaimType,
    pub status: ClaimStatus,
    pub status_label: &'static str,
    pub percentage: u8,
    pub current_stage: Stage,
    pub execution_path: Option<ExecutionPathKind>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Claim> for ClaimSummary {
    fn from(claim: &Claim) -> Self {
        let status = claim.status();
        let progress = progress(claim);
        Self {
            claim_id: claim.id.clone(),
            patient_name: claim.patient.name.clone(),
            patient_id: claim.patient.id.clone(),
            claim_type: claim.claim_type,
            status,
            status_label: status.label(),
            percentage: progress.percentage,
            current_stage: progress.current_stage,
            execution_path: claim.execution_path,
            retry_count: claim.retry_count,
            created_at: claim.created_at,
            updated_at: claim.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit.max(1)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimListResponse {
    pub claims: Vec<ClaimSummary>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pagination_rounds_up() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).total_pages, 2);
    }

    proptest! {
        #[test]
        fn pages_cover_every_claim(total in 0usize..10_000, limit in 1usize..=MAX_PAGE_SIZE) {
            let pagination = Pagination::new(1, limit, total);
            prop_assert!(pagination.total_pages * limit >= total);
            prop_assert!(pagination.total_pages == 0 || (pagination.total_pages - 1) * limit < total);
        }
    }
}
