//! Key model: the unit of authorization and its API representations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of a key.
///
/// `unused` is the only non-terminal state. A key moves to `used` on a successful
/// redemption, or to `revoked` when a redemption attempt finds it expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Unused,
    Used,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Used => "used",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unused" => Some(Self::Unused),
            "used" => Some(Self::Used),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key stored in database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Key {
    /// Opaque URL-safe token, primary identifier
    pub token: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    /// `None` means the key never expires by time
    pub expires_at: Option<DateTime<Utc>>,
    /// Subject the key was redeemed for
    pub redeemed_by: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    /// When the granted privilege was revoked (or the grant abandoned)
    pub grant_closed_at: Option<DateTime<Utc>>,
    /// Failed revocation attempts so far
    pub revoke_attempts: i32,
}

impl Key {
    /// Check if the key is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// Result of a successful redemption, handed to the privilege scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub token: String,
    pub subject: String,
    pub redeemed_at: DateTime<Utc>,
    pub grant_window: Duration,
}

/// Request to mint a key from the admin surface.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GenerateKeyRequest {
    /// Validity in seconds (server default when omitted)
    #[serde(default)]
    pub valid_for_secs: Option<u64>,
}

/// A freshly minted key, shown to the end user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeyCreatedResponse {
    pub token: String,
    pub status: KeyStatus,
    pub created_at: String,
    pub expires_at: Option<String>,
}

impl From<Key> for KeyCreatedResponse {
    fn from(key: Key) -> Self {
        Self {
            token: key.token,
            status: key.status,
            created_at: key.created_at.to_rfc3339(),
            expires_at: key.expires_at.map(|d| d.to_rfc3339()),
        }
    }
}

/// Listing row for the admin surface.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeyListItem {
    pub token: String,
    pub status: KeyStatus,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub redeemed_by: Option<String>,
    pub redeemed_at: Option<String>,
    /// True while a granted privilege has not been revoked yet
    pub grant_active: bool,
}

impl From<Key> for KeyListItem {
    fn from(key: Key) -> Self {
        Self {
            grant_active: key.status == KeyStatus::Used && key.grant_closed_at.is_none(),
            token: key.token,
            status: key.status,
            created_at: key.created_at.to_rfc3339(),
            expires_at: key.expires_at.map(|d| d.to_rfc3339()),
            redeemed_by: key.redeemed_by,
            redeemed_at: key.redeemed_at.map(|d| d.to_rfc3339()),
        }
    }
}

/// Query parameters for listing keys.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListKeysQuery {
    /// Number of keys to return (default: 50, max: 500)
    pub limit: Option<u64>,
}

/// Redemption request sent by the redeemer client.
///
/// Accepts the `key` / `discord_id` field names used by the chat bot as aliases.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemRequest {
    #[serde(default, alias = "key")]
    pub token: Option<String>,
    #[serde(default, alias = "discord_id")]
    pub subject: Option<String>,
}

/// Acknowledgement of a successful redemption.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemResponse {
    pub ok: bool,
    pub message: String,
}
