//! E2E tests: full key lifecycles, expiry and restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keygate_lib::models::{KeyStatus, PendingRevocation, RecoveryReport};

use super::test_helpers::*;

/// A one-second key is expired two seconds later: the first attempt reports
/// the expiry, later attempts report the revoked key.
#[actix_rt::test]
async fn test_expired_key_lifecycle() {
    let auth = Arc::new(RecordingAuthorizer::default());
    let ctx = TestContext::new(auth.clone(), HOUR).await;
    let app = create_test_app(&ctx).await;

    let token = generate_key(&app, Some(1)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let (status, body) = redeem(&app, &token, "42").await;
    assert_eq!(status, 410, "{}", body);
    assert_eq!(body["error"], "KEY_EXPIRED");
    assert_eq!(key_status(&ctx.pool, &token).await, KeyStatus::Revoked);

    let (status, body) = redeem(&app, &token, "42").await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "KEY_ALREADY_CONSUMED");
    assert_eq!(body["message"], "key is revoked");

    assert!(auth.calls().is_empty(), "an expired key never grants");
}

/// Key generated at T0 with 1h validity, redeemed for S at T0+10m, redeemed
/// again for S2 at T0+20m, process restarted at T0+65m: the grant for S is
/// rescheduled for the 5 minutes it has left.
#[actix_rt::test]
async fn test_restart_keeps_grant_until_its_deadline() {
    let t0 = Utc::now() - chrono::Duration::minutes(65);
    let before_restart = Arc::new(RecordingAuthorizer::default());
    let ctx = TestContext::new(before_restart.clone(), HOUR).await;

    insert_backdated_key(&ctx.pool, "k-restart", t0, HOUR).await;
    assert!(
        ctx.pool
            .mark_used_if_unused("k-restart", "111", t0 + chrono::Duration::minutes(10))
            .await
            .unwrap()
    );

    // second redemption attempt by another subject
    let app = create_test_app(&ctx).await;
    let (status, body) = redeem(&app, "k-restart", "222").await;
    assert_eq!(status, 409);
    assert_eq!(body["message"], "key is used");

    // the previous process died before the revocation fired
    let after_restart = Arc::new(RecordingAuthorizer::default());
    let restarted = TestContext::with_pool(ctx.pool.clone(), after_restart.clone(), HOUR);
    let report = restarted.scheduler.recover().await.unwrap();
    assert_eq!(report, RecoveryReport { overdue: 0, scheduled: 1 });

    let stored = ctx.pool.get_key("k-restart").await.unwrap().unwrap();
    let pending = PendingRevocation::from_key(&stored, HOUR).unwrap();
    let remaining = pending.remaining(Utc::now());
    assert!(
        remaining > Duration::from_secs(4 * 60 + 55) && remaining <= Duration::from_secs(5 * 60),
        "remaining {:?}",
        remaining
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(after_restart.revoked().is_empty(), "revoked before the deadline");
}

/// The same timeline with one minute scaled down to 20ms: after the restart
/// at T0+65 the grant for S is gone by T0+70.
#[actix_rt::test]
async fn test_grant_revoked_across_restart() {
    let minute = chrono::Duration::milliseconds(20);
    let window = Duration::from_millis(60 * 20);
    let t0 = Utc::now() - minute * 65;

    let ctx = TestContext::new(Arc::new(RecordingAuthorizer::default()), window).await;
    insert_backdated_key(&ctx.pool, "k-scaled", t0, window).await;
    assert!(
        ctx.pool
            .mark_used_if_unused("k-scaled", "111", t0 + minute * 10)
            .await
            .unwrap()
    );

    let app = create_test_app(&ctx).await;
    assert_eq!(redeem(&app, "k-scaled", "222").await.0, 409);

    let after_restart = Arc::new(RecordingAuthorizer::default());
    let restarted = TestContext::with_pool(ctx.pool.clone(), after_restart.clone(), window);
    let report = restarted.scheduler.recover().await.unwrap();
    assert_eq!(report.overdue + report.scheduled, 1);

    // past T0+70 with some slack
    tokio::time::sleep(Duration::from_millis(5 * 20 + 300)).await;
    assert_eq!(after_restart.revoked(), vec!["111".to_string()]);

    let app = create_test_app(&restarted).await;
    let (_, body) = list_keys(&app, None).await;
    assert_eq!(body["keys"][0]["grant_active"], false);

    // a second restart finds nothing left to do
    let report = restarted.scheduler.recover().await.unwrap();
    assert_eq!(report, RecoveryReport::default());
}

/// Restart after the deadline already passed: the revocation happens at once.
#[actix_rt::test]
async fn test_restart_after_deadline_revokes_immediately() {
    let t0 = Utc::now() - chrono::Duration::minutes(75);
    let ctx = TestContext::new(Arc::new(RecordingAuthorizer::default()), HOUR).await;
    insert_backdated_key(&ctx.pool, "k-late", t0, HOUR).await;
    assert!(
        ctx.pool
            .mark_used_if_unused("k-late", "111", t0 + chrono::Duration::minutes(10))
            .await
            .unwrap()
    );

    let after_restart = Arc::new(RecordingAuthorizer::default());
    let restarted = TestContext::with_pool(ctx.pool.clone(), after_restart.clone(), HOUR);
    let report = restarted.scheduler.recover().await.unwrap();
    assert_eq!(report, RecoveryReport { overdue: 1, scheduled: 0 });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(after_restart.revoked(), vec!["111".to_string()]);
}

/// Pending grants are rescheduled for their remaining time, not a fresh window.
#[actix_rt::test]
async fn test_restart_reschedules_remaining_time() {
    let window = Duration::from_secs(2);
    let ctx = TestContext::new(Arc::new(RecordingAuthorizer::default()), window).await;
    let app = create_test_app(&ctx).await;

    let token = generate_key(&app, None).await;
    assert_eq!(redeem(&app, &token, "42").await.0, 200);

    // restart half way through the window
    tokio::time::sleep(Duration::from_secs(1)).await;
    let after_restart = Arc::new(RecordingAuthorizer::default());
    let restarted = TestContext::with_pool(ctx.pool.clone(), after_restart.clone(), window);
    let report = restarted.scheduler.recover().await.unwrap();
    assert_eq!(report, RecoveryReport { overdue: 0, scheduled: 1 });
    assert!(after_restart.revoked().is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(after_restart.revoked(), vec!["42".to_string()]);
}

#[actix_rt::test]
async fn test_grant_revoked_after_window() {
    let auth = Arc::new(RecordingAuthorizer::default());
    let ctx = TestContext::new(auth.clone(), Duration::from_millis(500)).await;
    let app = create_test_app(&ctx).await;

    let token = generate_key(&app, None).await;
    assert_eq!(redeem(&app, &token, "42").await.0, 200);
    assert!(auth.revoked().is_empty());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        auth.calls(),
        vec![("grant", "42".to_string()), ("revoke", "42".to_string())]
    );
}

#[actix_rt::test]
async fn test_concurrent_redemptions_have_one_winner() {
    let auth = Arc::new(RecordingAuthorizer::default());
    let pool = create_test_pool_with_connections(4).await;
    let ctx = TestContext::with_pool(pool, auth.clone(), HOUR);
    let app = create_test_app(&ctx).await;

    let token = generate_key(&app, None).await;

    let attempts = (0..10).map(|i| {
        let subject = format!("{}", 1000 + i);
        let app = &app;
        let token = token.clone();
        async move { redeem(app, &token, &subject).await.0 }
    });
    let statuses = futures_util::future::join_all(attempts).await;

    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 409).count(), 9);
    assert_eq!(auth.granted().len(), 1);
}
