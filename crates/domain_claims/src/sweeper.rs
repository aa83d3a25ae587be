//! Retention sweep
//!
//! Background service that periodically evicts claims older than the
//! retention window. It runs on its own interval task and never holds the
//! store lock longer than a single `sweep` call.
//!
//! ```rust,ignore
//! let cancel = CancellationToken::new();
//! let handle = spawn_retention_sweep(repository.clone(), RetentionPolicy::default(), cancel.clone());
//! // on shutdown
//! cancel.cancel();
//! handle.await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::ports::ClaimRepository;

/// Retention window and sweep cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Claims created longer ago than this are dropped
    pub retention: Duration,
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Runs a single sweep and returns the number of evicted claims
pub async fn sweep_once(
    repository: &dyn ClaimRepository,
    retention: Duration,
) -> Result<usize, StoreError> {
    let retention = chrono::Duration::from_std(retention)
        .map_err(|e| StoreError::backend(format!("invalid retention window: {}", e)))?;
    let cutoff = Utc::now() - retention;
    repository.sweep(cutoff).await
}

/// Spawns the periodic sweep; the task exits when `cancel` fires
pub fn spawn_retention_sweep(
    repository: Arc<dyn ClaimRepository>,
    policy: RetentionPolicy,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            retention_secs = policy.retention.as_secs(),
            interval_secs = policy.interval.as_secs(),
            "Starting claim retention sweep"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Claim retention sweep stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match sweep_once(repository.as_ref(), policy.retention).await {
                        Ok(0) => debug!("No expired claims this cycle"),
                        Ok(removed) => info!(removed, "Evicted expired claims"),
                        Err(e) => error!(error = %e, "Claim retention sweep failed"),
                    }
                }
            }
        }
    })
}
