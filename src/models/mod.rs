//! Domain models for Keygate.

pub mod grant;
pub mod key;

// Re-export commonly used types
pub use grant::{PendingRevocation, RecoveryReport};
pub use key::{
    GenerateKeyRequest, Key, KeyCreatedResponse, KeyListItem, KeyStatus, ListKeysQuery,
    RedeemRequest, RedeemResponse, Redemption,
};
