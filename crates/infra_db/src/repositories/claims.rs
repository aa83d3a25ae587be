//! PostgreSQL claim repository
//!
//! Claims are stored in a single `claims` table. Columns duplicate the fields
//! needed for filtering and ordering; the `record` column holds the full
//! claim as JSONB and is the source of truth when reading.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{ClaimId, DomainPort, HealthCheckResult, HealthCheckable};
use domain_claims::ports::{ClaimPage, ClaimRepository, ListQuery};
use domain_claims::{Claim, StoreError};

use crate::error::DatabaseError;

/// `ClaimRepository` backed by PostgreSQL
///
/// `save` is a conditional `UPDATE ... WHERE version = $n`; zero affected
/// rows means either the claim is gone or another writer bumped the version.
#[derive(Debug, Clone)]
pub struct PgClaimRepository {
    pool: PgPool,
}

impl PgClaimRepository {
    /// Creates a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn stored_version(&self, id: &ClaimId) -> Result<Option<i64>, DatabaseError> {
        let version: Option<(i64,)> = sqlx::query_as("SELECT version FROM claims WHERE claim_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.map(|(v,)| v))
    }

    async fn count(&self, status: Option<&str>) -> Result<i64, DatabaseError> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM claims WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

fn to_i64(value: u64) -> Result<i64, DatabaseError> {
    i64::try_from(value).map_err(|_| DatabaseError::SerializationError(format!("{} exceeds BIGINT", value)))
}

impl DomainPort for PgClaimRepository {}

#[async_trait]
impl HealthCheckable for PgClaimRepository {
    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthCheckResult::healthy("postgres-claim-store", started.elapsed().as_millis() as u64),
            Err(e) => HealthCheckResult::unhealthy("postgres-claim-store", e.to_string()),
        }
    }
}

#[async_trait]
impl ClaimRepository for PgClaimRepository {
    #[instrument(skip(self, claim), fields(claim_id = %claim.id))]
    async fn insert(&self, mut claim: Claim) -> Result<Claim, StoreError> {
        claim.version = 1;
        let result = sqlx::query(
            r#"
            INSERT INTO claims (claim_id, status, version, created_at, updated_at, record)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (claim_id) DO NOTHING
            "#,
        )
        .bind(claim.id.as_str())
        .bind(claim.status().as_str())
        .bind(1_i64)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .bind(Json(&claim))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(claim.id));
        }
        Ok(claim)
    }

    async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError> {
        let row: Option<(Json<Claim>,)> = sqlx::query_as("SELECT record FROM claims WHERE claim_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.map(|(Json(claim),)| claim))
    }

    #[instrument(skip(self, claim), fields(claim_id = %claim.id, version = claim.version))]
    async fn save(&self, claim: &Claim) -> Result<Claim, StoreError> {
        let mut next = claim.clone();
        next.version = claim.version + 1;

        let result = sqlx::query(
            r#"
            UPDATE claims
            SET status = $2, version = $3, updated_at = $4, record = $5
            WHERE claim_id = $1 AND version = $6
            "#,
        )
        .bind(next.id.as_str())
        .bind(next.status().as_str())
        .bind(to_i64(next.version)?)
        .bind(next.updated_at)
        .bind(Json(&next))
        .bind(to_i64(claim.version)?)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 1 {
            debug!(version = next.version, "Claim saved");
            return Ok(next);
        }

        match self.stored_version(&claim.id).await? {
            None => Err(StoreError::NotFound(claim.id.clone())),
            Some(actual) => Err(StoreError::VersionConflict {
                id: claim.id.clone(),
                expected: claim.version,
                actual: actual.max(0) as u64,
            }),
        }
    }

    async fn list(&self, query: &ListQuery) -> Result<ClaimPage, StoreError> {
        let status = query.status.map(|s| s.as_str());
        let rows: Vec<(Json<Claim>,)> = sqlx::query_as(
            r#"
            SELECT record FROM claims
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, claim_id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(to_i64(query.limit as u64)?)
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        let total = self.count(status).await?;
        Ok(ClaimPage {
            items: rows.into_iter().map(|(Json(claim),)| claim).collect(),
            total: total.max(0) as usize,
        })
    }

    #[instrument(skip(self))]
    async fn sweep(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM claims WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() as usize)
    }
}
