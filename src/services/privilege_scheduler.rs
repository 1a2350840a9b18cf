//! Privilege scheduler: grants a privilege after a redemption and removes it
//! once the grant window has elapsed.
//!
//! Pending revocations are never held only in memory. Each one is derived from
//! a `used` key row whose `grant_closed_at` is still null, so after a restart
//! [`PrivilegeScheduler::recover`] rebuilds every revocation the previous
//! process did not finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{PendingRevocation, RecoveryReport, Redemption};

use super::authorizer::Authorizer;

/// Schedules grants and their deferred revocations.
#[derive(Clone)]
pub struct PrivilegeScheduler {
    pool: DbPool,
    authorizer: Arc<dyn Authorizer>,
    settings: SchedulerSettings,
    grant_window: Duration,
}

impl PrivilegeScheduler {
    pub fn new(
        pool: DbPool,
        authorizer: Arc<dyn Authorizer>,
        settings: SchedulerSettings,
        grant_window: Duration,
    ) -> Self {
        Self {
            pool,
            authorizer,
            settings,
            grant_window,
        }
    }

    /// Grant the privilege for a fresh redemption and schedule its removal.
    ///
    /// Returns once the grant call finished; the revocation runs in the
    /// background. When the outcome of a failed grant is unknown (timeout or
    /// transport error) the grant stays open and is revoked right away, so a
    /// role the remote applied anyway cannot outlive the failure.
    pub async fn grant_timed(&self, redemption: &Redemption) -> AppResult<()> {
        let subject = redemption.subject.as_str();
        let pending = PendingRevocation::from(redemption);

        let (reason, definite) =
            match timeout(self.settings.call_timeout, self.authorizer.grant(subject)).await {
                Ok(Ok(())) => {
                    info!(
                        subject = %subject,
                        revoke_at = %pending.deadline(),
                        "Privilege granted"
                    );
                    self.schedule_revocation(pending);
                    return Ok(());
                }
                Ok(Err(e)) => (e.to_string(), e.is_definite()),
                Err(_) => (self.timeout_reason(), false),
            };

        if definite {
            warn!(subject = %subject, error = %reason, "Privilege grant refused");
            // Nothing was granted, so there is nothing left to revoke.
            self.pool
                .close_grant(&redemption.token, Utc::now())
                .await?;
        } else {
            warn!(
                subject = %subject,
                error = %reason,
                "Privilege grant outcome unknown, revoking"
            );
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.revoke_now(&pending).await;
            });
        }

        Err(AppError::GrantFailed(reason))
    }

    /// Spawn a task that revokes `pending` at its deadline.
    pub fn schedule_revocation(&self, pending: PendingRevocation) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let wait = pending.remaining(Utc::now());
            if !wait.is_zero() {
                debug!(subject = %pending.subject, wait_secs = wait.as_secs(), "Revocation scheduled");
                tokio::time::sleep(wait).await;
            }
            scheduler.revoke_now(&pending).await;
        })
    }

    /// Revoke immediately and close the grant. Returns whether the privilege
    /// is gone.
    ///
    /// Failures are counted on the key row and never propagated: a failed
    /// revocation must not affect any other one.
    pub async fn revoke_now(&self, pending: &PendingRevocation) -> bool {
        let subject = pending.subject.as_str();

        let failure = match timeout(self.settings.call_timeout, self.authorizer.revoke(subject)).await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(self.timeout_reason()),
        };

        match failure {
            None => {
                match self.pool.close_grant(&pending.token, Utc::now()).await {
                    Ok(true) => info!(subject = %subject, "Privilege revoked"),
                    Ok(false) => debug!(subject = %subject, "Grant was already closed"),
                    // The authorizer call succeeded, a later retry only repeats it.
                    Err(e) => error!(subject = %subject, error = %e, "Privilege revoked but grant not closed"),
                }
                true
            }
            Some(reason) => {
                self.record_failure(pending, &AppError::RevokeFailed(reason)).await;
                false
            }
        }
    }

    fn timeout_reason(&self) -> String {
        format!("timed out after {}ms", self.settings.call_timeout.as_millis())
    }

    async fn record_failure(&self, pending: &PendingRevocation, reason: &AppError) {
        let subject = pending.subject.as_str();
        let max = self.settings.revoke_max_attempts;

        match self.pool.record_revoke_failure(&pending.token).await {
            Ok(attempts) if u32::try_from(attempts).unwrap_or(0) >= max => {
                error!(
                    subject = %subject,
                    attempts,
                    error = %reason,
                    "Giving up on revocation; the privilege must be removed manually"
                );
            }
            Ok(attempts) => {
                warn!(
                    subject = %subject,
                    attempts,
                    max_attempts = max,
                    error = %reason,
                    "Revocation failed, will retry"
                );
            }
            Err(e) => {
                error!(
                    subject = %subject,
                    error = %reason,
                    db_error = %e,
                    "Revocation failed and the failure could not be recorded"
                );
            }
        }
    }

    /// Rebuild pending revocations from storage after a restart.
    ///
    /// Grants whose window elapsed while the process was down are revoked right
    /// away; the others are scheduled for exactly their remaining time.
    pub async fn recover(&self) -> AppResult<RecoveryReport> {
        let open = self
            .pool
            .open_grants(self.settings.revoke_max_attempts)
            .await?;
        let now = Utc::now();
        let mut report = RecoveryReport::default();

        for key in &open {
            let Some(pending) = PendingRevocation::from_key(key, self.grant_window) else {
                warn!("Skipping used key without redemption details");
                continue;
            };

            if pending.is_overdue(now) {
                report.overdue += 1;
            } else {
                report.scheduled += 1;
            }
            self.schedule_revocation(pending);
        }

        if report.overdue > 0 || report.scheduled > 0 {
            info!(
                overdue = report.overdue,
                scheduled = report.scheduled,
                "Recovered pending revocations"
            );
        }

        Ok(report)
    }

    /// Retry revocations that are past their deadline, already failed at least
    /// once and still have attempts left. Returns how many succeeded.
    pub async fn retry_failed(&self) -> AppResult<usize> {
        let window = chrono::Duration::from_std(self.grant_window)
            .map_err(|_| AppError::InvalidInput("grant window out of range".to_string()))?;
        let Some(cutoff) = Utc::now().checked_sub_signed(window) else {
            return Ok(0);
        };

        let failed = self
            .pool
            .failed_open_grants(self.settings.revoke_max_attempts, cutoff)
            .await?;

        let mut revoked = 0;
        for key in &failed {
            if let Some(pending) = PendingRevocation::from_key(key, self.grant_window)
                && self.revoke_now(&pending).await
            {
                revoked += 1;
            }
        }

        Ok(revoked)
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }
}
