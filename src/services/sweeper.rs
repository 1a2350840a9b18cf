//! Periodic sweeper for expired keys and failed revocations.
//!
//! Unused keys past their expiry are only counted: they are revoked lazily by
//! the next redemption attempt. The sweeper does change state for grants whose
//! revocation failed, by handing them back to the scheduler.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::db::DbPool;
use crate::error::AppResult;

use super::privilege_scheduler::PrivilegeScheduler;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired_unused: u64,
    pub retried: usize,
    pub stuck: u64,
}

/// Start the sweeper background task.
pub fn start_sweeper_task(pool: DbPool, scheduler: PrivilegeScheduler, period: Duration) {
    tokio::spawn(async move {
        info!("Starting sweeper (interval: {} seconds)", period.as_secs());

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; startup recovery already ran.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if let Err(e) = run_sweep(&pool, &scheduler).await {
                error!("Sweeper error: {}", e);
            }
        }
    });
}

/// Run a single sweep.
pub async fn run_sweep(pool: &DbPool, scheduler: &PrivilegeScheduler) -> AppResult<SweepStats> {
    let expired_unused = pool.count_expired_unused(Utc::now()).await?;
    if expired_unused > 0 {
        info!(count = expired_unused, "Expired keys awaiting revocation");
    }

    let retried = scheduler.retry_failed().await?;
    if retried > 0 {
        info!(count = retried, "Retried revocations succeeded");
    }

    let stuck = pool
        .count_stuck_grants(scheduler.settings().revoke_max_attempts)
        .await?;
    if stuck > 0 {
        warn!(count = stuck, "Privileges could not be revoked and need manual removal");
    }

    debug!(expired_unused, retried, stuck, "Sweep complete");

    Ok(SweepStats {
        expired_unused,
        retried,
        stuck,
    })
}
