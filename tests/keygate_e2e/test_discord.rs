//! E2E tests: the Discord role authorizer against a mock Discord API.

use std::sync::Arc;
use std::time::Duration;

use keygate_lib::config::DiscordSettings;
use keygate_lib::services::discord::DiscordRoleAuthorizer;
use keygate_lib::services::{Authorizer, AuthorizerError};
use secrecy::SecretString;

use super::mock_discord::MockDiscord;
use super::test_helpers::*;

const GUILD_ID: u64 = 111111111111111111;
const ROLE_ID: u64 = 222222222222222222;
const MEMBER_ID: &str = "333333333333333333";

fn discord_authorizer(mock: &MockDiscord) -> DiscordRoleAuthorizer {
    DiscordRoleAuthorizer::new(&DiscordSettings {
        api_base: mock.api_base.clone(),
        bot_token: SecretString::from("test-bot-token".to_string()),
        guild_id: GUILD_ID,
        role_id: ROLE_ID,
    })
    .expect("Failed to build authorizer")
}

#[actix_rt::test]
async fn test_grant_and_revoke_call_role_endpoint() {
    let mock = MockDiscord::start().await;
    let authorizer = discord_authorizer(&mock);

    authorizer.grant(MEMBER_ID).await.unwrap();
    authorizer.revoke(MEMBER_ID).await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);

    assert_eq!(calls[0].method, "PUT");
    assert_eq!(calls[0].guild_id, GUILD_ID);
    assert_eq!(calls[0].role_id, ROLE_ID);
    assert_eq!(calls[0].user_id.to_string(), MEMBER_ID);
    assert_eq!(calls[0].authorization.as_deref(), Some("Bot test-bot-token"));
    assert_eq!(calls[0].audit_reason.as_deref(), Some("Key redeemed"));

    assert_eq!(calls[1].method, "DELETE");
    assert_eq!(calls[1].audit_reason.as_deref(), Some("Access expired"));
}

#[actix_rt::test]
async fn test_error_status_is_rejected() {
    let mock = MockDiscord::start().await;
    mock.fail_with(403);
    let authorizer = discord_authorizer(&mock);

    match authorizer.grant(MEMBER_ID).await {
        Err(AuthorizerError::Rejected { status, body }) => {
            assert_eq!(status, 403);
            assert!(body.contains("Missing Permissions"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[actix_rt::test]
async fn test_non_numeric_subject_never_reaches_discord() {
    let mock = MockDiscord::start().await;
    let authorizer = discord_authorizer(&mock);

    assert!(matches!(
        authorizer.grant("someone#1234").await,
        Err(AuthorizerError::InvalidSubject(_))
    ));
    assert!(mock.calls().is_empty());
}

#[actix_rt::test]
async fn test_redemption_adds_and_later_removes_role() {
    let mock = MockDiscord::start().await;
    let ctx = TestContext::new(Arc::new(discord_authorizer(&mock)), Duration::from_millis(500)).await;
    let app = create_test_app(&ctx).await;

    let token = generate_key(&app, None).await;
    let (status, body) = redeem(&app, &token, MEMBER_ID).await;
    assert_eq!(status, 200, "{}", body);

    let methods: Vec<String> = mock.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec!["PUT"]);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let methods: Vec<String> = mock.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec!["PUT", "DELETE"]);

    let stored = ctx.pool.get_key(&token).await.unwrap().unwrap();
    assert!(stored.grant_closed_at.is_some());
}

#[actix_rt::test]
async fn test_rejected_grant_returns_bad_gateway() {
    let mock = MockDiscord::start().await;
    mock.fail_with(403);
    let ctx = TestContext::new(Arc::new(discord_authorizer(&mock)), HOUR).await;
    let app = create_test_app(&ctx).await;

    let token = generate_key(&app, None).await;
    let (status, body) = redeem(&app, &token, MEMBER_ID).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"], "GRANT_FAILED");
}
