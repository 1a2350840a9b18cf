//! Authorization collaborator: the external system that actually holds the
//! privilege (e.g. a chat-server role).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::AuthorizerSettings;
use crate::services::discord::DiscordRoleAuthorizer;

/// Errors reported by an authorizer.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizerError {
    #[error("subject '{0}' is not valid for this authorizer")]
    InvalidSubject(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl AuthorizerError {
    /// Whether the remote definitely did not apply the change.
    ///
    /// A transport error may hit after the request was delivered, so the
    /// privilege has to be treated as possibly granted.
    pub fn is_definite(&self) -> bool {
        matches!(self, Self::InvalidSubject(_) | Self::Rejected { .. })
    }
}

/// Grants and revokes a privilege for an opaque subject identifier.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn grant(&self, subject: &str) -> Result<(), AuthorizerError>;
    async fn revoke(&self, subject: &str) -> Result<(), AuthorizerError>;
}

/// Authorizer that only logs, for development without a chat server.
#[derive(Debug, Default, Clone)]
pub struct LogOnlyAuthorizer;

#[async_trait]
impl Authorizer for LogOnlyAuthorizer {
    async fn grant(&self, subject: &str) -> Result<(), AuthorizerError> {
        info!(subject = %subject, "Privilege granted (log only)");
        Ok(())
    }

    async fn revoke(&self, subject: &str) -> Result<(), AuthorizerError> {
        info!(subject = %subject, "Privilege revoked (log only)");
        Ok(())
    }
}

/// Build the configured authorizer.
pub fn from_settings(settings: &AuthorizerSettings) -> Result<Arc<dyn Authorizer>, AuthorizerError> {
    match settings {
        AuthorizerSettings::LogOnly => Ok(Arc::new(LogOnlyAuthorizer)),
        AuthorizerSettings::Discord(discord) => Ok(Arc::new(DiscordRoleAuthorizer::new(discord)?)),
    }
}
