//! Discord guild-role authorizer.
//!
//! Grants by adding a configured role to a guild member and revokes by removing
//! it, through the Discord REST API:
//! `PUT|DELETE /guilds/{guild}/members/{user}/roles/{role}`.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::authorizer::{Authorizer, AuthorizerError};
use crate::config::DiscordSettings;

/// Header Discord records in the guild audit log.
const AUDIT_LOG_REASON_HEADER: &str = "X-Audit-Log-Reason";
const GRANT_REASON: &str = "Key redeemed";
const REVOKE_REASON: &str = "Access expired";

/// Adds/removes one role for guild members identified by their user id.
pub struct DiscordRoleAuthorizer {
    client: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
    guild_id: u64,
    role_id: u64,
}

impl DiscordRoleAuthorizer {
    pub fn new(settings: &DiscordSettings) -> Result<Self, AuthorizerError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("keygate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthorizerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            guild_id: settings.guild_id,
            role_id: settings.role_id,
        })
    }

    /// Role endpoint for a member. Subjects must be numeric user ids (snowflakes).
    fn role_url(&self, subject: &str) -> Result<String, AuthorizerError> {
        let member_id: u64 = subject
            .parse()
            .map_err(|_| AuthorizerError::InvalidSubject(subject.to_string()))?;

        Ok(format!(
            "{}/guilds/{}/members/{}/roles/{}",
            self.api_base, self.guild_id, member_id, self.role_id
        ))
    }

    async fn send(&self, method: Method, subject: &str, reason: &str) -> Result<(), AuthorizerError> {
        let url = self.role_url(subject)?;
        debug!(%method, subject = %subject, "Calling Discord role endpoint");

        let resp = self
            .client
            .request(method, url)
            .header(
                AUTHORIZATION,
                format!("Bot {}", self.bot_token.expose_secret()),
            )
            .header(AUDIT_LOG_REASON_HEADER, reason)
            .header(CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| AuthorizerError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(AuthorizerError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Authorizer for DiscordRoleAuthorizer {
    async fn grant(&self, subject: &str) -> Result<(), AuthorizerError> {
        self.send(Method::PUT, subject, GRANT_REASON).await
    }

    async fn revoke(&self, subject: &str) -> Result<(), AuthorizerError> {
        self.send(Method::DELETE, subject, REVOKE_REASON).await
    }
}
