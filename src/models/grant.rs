//! Privilege grant bookkeeping derived from redeemed keys.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Key, Redemption};

/// A granted privilege that still has to be revoked.
///
/// Never stored on its own: it is rebuilt from a `used` key row whose grant is
/// not closed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRevocation {
    pub token: String,
    pub subject: String,
    pub redeemed_at: DateTime<Utc>,
    pub window: Duration,
}

impl PendingRevocation {
    /// Rebuild from a key row. Returns `None` for keys that were never redeemed.
    pub fn from_key(key: &Key, window: Duration) -> Option<Self> {
        Some(Self {
            token: key.token.clone(),
            subject: key.redeemed_by.clone()?,
            redeemed_at: key.redeemed_at?,
            window,
        })
    }

    /// Point in time at which the privilege must be gone.
    pub fn deadline(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|w| self.redeemed_at.checked_add_signed(w))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline() - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}

impl From<&Redemption> for PendingRevocation {
    fn from(r: &Redemption) -> Self {
        Self {
            token: r.token.clone(),
            subject: r.subject.clone(),
            redeemed_at: r.redeemed_at,
            window: r.grant_window,
        }
    }
}

/// Outcome of the startup recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Grants whose window elapsed while the process was down
    pub overdue: usize,
    /// Grants rescheduled for their remaining time
    pub scheduled: usize,
}
