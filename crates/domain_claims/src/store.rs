//! In-memory claim store
//!
//! Default [`ClaimRepository`] backend. Claims live in a map guarded by a
//! tokio `RwLock`; the write lock makes each version check and update atomic.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use core_kernel::{ClaimId, DomainPort, HealthCheckResult, HealthCheckable};
use crate::claim::Claim;
use crate::error::StoreError;
use crate::ports::{ClaimPage, ClaimRepository, ListQuery};

/// Process-local claim storage
#[derive(Debug, Default)]
pub struct InMemoryClaimStore {
    claims: RwLock<HashMap<ClaimId, Claim>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored claims
    pub async fn len(&self) -> usize {
        self.claims.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.claims.read().await.is_empty()
    }
}

impl DomainPort for InMemoryClaimStore {}

#[async_trait]
impl HealthCheckable for InMemoryClaimStore {
    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let _guard = self.claims.read().await;
        HealthCheckResult::healthy("in-memory-claim-store", started.elapsed().as_millis() as u64)
    }
}

#[async_trait]
impl ClaimRepository for InMemoryClaimStore {
    async fn insert(&self, mut claim: Claim) -> Result<Claim, StoreError> {
        let mut claims = self.claims.write().await;
        if claims.contains_key(&claim.id) {
            return Err(StoreError::Duplicate(claim.id));
        }
        claim.version = 1;
        claims.insert(claim.id.clone(), claim.clone());
        Ok(claim)
    }

    async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError> {
        Ok(self.claims.read().await.get(id).cloned())
    }

    async fn save(&self, claim: &Claim) -> Result<Claim, StoreError> {
        let mut claims = self.claims.write().await;
        let stored = claims
            .get_mut(&claim.id)
            .ok_or_else(|| StoreError::NotFound(claim.id.clone()))?;

        if stored.version != claim.version {
            return Err(StoreError::VersionConflict {
                id: claim.id.clone(),
                expected: claim.version,
                actual: stored.version,
            });
        }

        let mut next = claim.clone();
        next.version = claim.version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list(&self, query: &ListQuery) -> Result<ClaimPage, StoreError> {
        let claims = self.claims.read().await;
        let mut matching: Vec<&Claim> = claims
            .values()
            .filter(|c| query.status.map_or(true, |s| c.status() == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.as_str().cmp(a.id.as_str())));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit)
            .cloned()
            .collect();

        Ok(ClaimPage { items, total })
    }

    async fn sweep(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut claims = self.claims.write().await;
        let before = claims.len();
        claims.retain(|_, claim| claim.created_at >= cutoff);
        Ok(before - claims.len())
    }
}
