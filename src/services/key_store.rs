//! Key store: key generation, redemption state machine and listing.
//!
//! State machine per key:
//!
//! ```text
//!            redeem (not expired)
//!   unused ───────────────────────▶ used
//!      │
//!      │ redeem attempt after expires_at
//!      ▼
//!   revoked
//! ```
//!
//! `used` and `revoked` are terminal. Expiry is detected lazily, when a
//! redemption attempt touches a stale key. Concurrent redeemers serialize on the
//! conditional update in [`DbPool::mark_used_if_unused`]; there is no
//! application-level lock.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::db::DbPool;
use crate::db::keys::InsertOutcome;
use crate::error::{AppError, AppResult};
use crate::models::{Key, KeyStatus, Redemption};

/// Random bytes per token (128 bits).
const TOKEN_BYTES: usize = 16;
/// Fresh tokens tried before giving up on an insert.
const MAX_INSERT_ATTEMPTS: usize = 5;
/// Default and maximum page size of `list_recent`.
pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 500;
/// Longest subject identifier accepted.
const MAX_SUBJECT_LEN: usize = 64;

/// Generate a new random token: 128 bits from the thread CSPRNG, URL-safe base64.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Key store bound to a database pool.
#[derive(Clone)]
pub struct KeyStore {
    pool: DbPool,
    grant_window: Duration,
    max_validity: Duration,
}

impl KeyStore {
    pub fn new(pool: DbPool, grant_window: Duration, max_validity: Duration) -> Self {
        Self {
            pool,
            grant_window,
            max_validity,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Mint a new unused key valid for `validity`.
    pub async fn generate(&self, validity: Duration) -> AppResult<Key> {
        if validity.is_zero() {
            return Err(AppError::InvalidInput(
                "validity must be at least one second".to_string(),
            ));
        }
        if validity > self.max_validity {
            return Err(AppError::InvalidInput(format!(
                "validity must not exceed {} seconds",
                self.max_validity.as_secs()
            )));
        }
        let validity = chrono::Duration::from_std(validity)
            .map_err(|_| AppError::InvalidInput("validity out of range".to_string()))?;

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            let now = Utc::now();
            let expires_at = now
                .checked_add_signed(validity)
                .ok_or_else(|| AppError::InvalidInput("validity out of range".to_string()))?;
            let key = Key {
                token: generate_token(),
                status: KeyStatus::Unused,
                created_at: now,
                expires_at: Some(expires_at),
                redeemed_by: None,
                redeemed_at: None,
                grant_closed_at: None,
                revoke_attempts: 0,
            };

            match self.pool.insert_key(&key).await? {
                InsertOutcome::Inserted => {
                    info!(%expires_at, "Key generated");
                    return Ok(key);
                }
                InsertOutcome::TokenTaken => {
                    warn!(attempt, "Generated token collided with an existing key, retrying");
                }
            }
        }

        Err(AppError::StorageUnavailable(format!(
            "no unique token after {} attempts",
            MAX_INSERT_ATTEMPTS
        )))
    }

    /// Redeem `token` for `subject`.
    ///
    /// Exactly one of any number of concurrent calls for the same unused,
    /// unexpired token succeeds; the others fail with `KeyAlreadyConsumed`.
    pub async fn redeem(&self, token: &str, subject: &str) -> AppResult<Redemption> {
        let token = token.trim();
        let subject = subject.trim();
        if token.is_empty() || subject.is_empty() {
            return Err(AppError::InvalidInput("missing key or subject".to_string()));
        }
        if subject.len() > MAX_SUBJECT_LEN {
            return Err(AppError::InvalidInput("subject is too long".to_string()));
        }

        let key = self.pool.get_key(token).await?.ok_or(AppError::KeyNotFound)?;
        let now = Utc::now();

        let mut status = key.status;
        if key.is_expired_at(now) {
            if self.pool.revoke_if_unused(token).await? {
                info!(status = %KeyStatus::Revoked, "Expired key revoked on redemption attempt");
                return Err(AppError::KeyExpired);
            }
            // Already terminal, possibly just now by a concurrent redeemer.
            status = self.current_status(token, status).await?;
        }

        if status != KeyStatus::Unused {
            debug!(%status, "Redemption attempt on consumed key");
            return Err(AppError::KeyAlreadyConsumed(status));
        }

        if !self.pool.mark_used_if_unused(token, subject, now).await? {
            let status = self.current_status(token, KeyStatus::Used).await?;
            debug!(%status, "Lost redemption race");
            return Err(AppError::KeyAlreadyConsumed(status));
        }

        info!(subject = %subject, "Key redeemed");

        Ok(Redemption {
            token: token.to_string(),
            subject: subject.to_string(),
            redeemed_at: now,
            grant_window: self.grant_window,
        })
    }

    /// Most recent keys, newest first. A zero limit yields an empty list.
    pub async fn list_recent(&self, limit: u64) -> AppResult<Vec<Key>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.pool
            .list_recent_keys(limit.min(MAX_LIST_LIMIT))
            .await
    }

    /// Look up a single key.
    pub async fn get(&self, token: &str) -> AppResult<Option<Key>> {
        self.pool.get_key(token).await
    }

    async fn current_status(&self, token: &str, fallback: KeyStatus) -> AppResult<KeyStatus> {
        Ok(self
            .pool
            .get_key(token)
            .await?
            .map(|k| k.status)
            .unwrap_or(fallback))
    }
}
