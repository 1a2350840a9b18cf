//! Authentication of callers by shared secrets.
//!
//! Two secrets guard the API: the admin key (`X-Admin-Key`) for key generation
//! and listing, and the redeemer secret (`X-API-Key`) presented by the trusted
//! client that forwards redemptions.

mod extractor;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

pub use extractor::{AdminAuth, AuthError, RedeemerAuth};

/// An optional configured secret.
///
/// `Debug` never prints the value, and the memory is zeroized on drop.
/// Verification always fails when no secret is configured.
#[derive(Clone)]
pub struct SharedSecret(Option<SecretString>);

impl SharedSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self(secret.filter(|s| !s.is_empty()).map(SecretString::from))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    /// Compare in constant time for equal-length input. A length mismatch
    /// returns early, so the secret's length is not hidden.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            Some(secret) => secret
                .expose_secret()
                .as_bytes()
                .ct_eq(provided.as_bytes())
                .into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "SharedSecret([REDACTED])"),
            None => write!(f, "SharedSecret(None)"),
        }
    }
}

/// Admin key, registered as app data for [`AdminAuth`].
#[derive(Clone, Debug)]
pub struct AdminKey(pub SharedSecret);

impl AdminKey {
    pub fn new(key: Option<String>) -> Self {
        Self(SharedSecret::new(key))
    }
}

/// Redeemer client secret, registered as app data for [`RedeemerAuth`].
#[derive(Clone, Debug)]
pub struct ApiSecret(pub SharedSecret);

impl ApiSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self(SharedSecret::new(secret))
    }
}
