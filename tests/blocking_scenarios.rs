//! End-to-end blocking scenarios against a guarded router, on virtual time.
//!
//! Window 5 min, threshold 10, block duration 30 min.

use std::sync::Arc;
use std::time::Duration;

use abuse_guard::security::{AbuseGuard, AbuseRejection};
use axum::http::StatusCode;

mod common;

async fn body(response: axum::response::Response) -> AbuseRejection {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_nine_failures_do_not_block() {
    let guard = Arc::new(AbuseGuard::default());
    let app = common::guarded_app(guard.clone(), [1, 2, 3, 4]);

    for _ in 0..9 {
        assert_eq!(common::send(&app, 401).await.status(), StatusCode::UNAUTHORIZED);
        tokio::time::advance(Duration::from_secs(6)).await;
    }
    assert!(!guard.is_blocked("1.2.3.4"));
}

#[tokio::test(start_paused = true)]
async fn test_tenth_failure_in_window_blocks() {
    let guard = Arc::new(AbuseGuard::default());
    let app = common::guarded_app(guard.clone(), [1, 2, 3, 4]);

    for _ in 0..9 {
        common::send(&app, 404).await;
    }
    tokio::time::advance(Duration::from_secs(2 * 60)).await;

    let response = common::send(&app, 404).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(guard.is_blocked("1.2.3.4"));

    let response = common::send(&app, 200).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let rejection = body(response).await;
    assert_eq!(rejection.error, "Access forbidden");
    assert!(rejection.blocked_until > 0);

    // Other clients are unaffected
    let other = common::guarded_app(guard, [4, 3, 2, 1]);
    assert_eq!(common::send(&other, 200).await.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_spaced_failures_do_not_accumulate() {
    let guard = Arc::new(AbuseGuard::default());
    let app = common::guarded_app(guard.clone(), [5, 6, 7, 8]);

    common::send(&app, 400).await;
    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    common::send(&app, 400).await;

    assert_eq!(guard.attempts("5.6.7.8"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_block_lifts_after_duration_with_fresh_history() {
    let guard = Arc::new(AbuseGuard::default());
    let app = common::guarded_app(guard.clone(), [1, 2, 3, 4]);

    for _ in 0..10 {
        common::send(&app, 404).await;
    }
    assert!(guard.is_blocked("1.2.3.4"));

    tokio::time::sleep(Duration::from_secs(30 * 60 - 1)).await;
    assert_eq!(common::send(&app, 200).await.status(), StatusCode::FORBIDDEN);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(common::send(&app, 200).await.status(), StatusCode::OK);

    assert_eq!(common::send(&app, 404).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(guard.attempts("1.2.3.4"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_block_and_unblock() {
    let guard = Arc::new(AbuseGuard::default());
    let app = common::guarded_app(guard.clone(), [9, 9, 9, 9]);

    guard.manual_block("9.9.9.9");
    assert!(guard.stats().blocked_keys.contains("9.9.9.9"));
    assert_eq!(common::send(&app, 200).await.status(), StatusCode::FORBIDDEN);

    assert!(guard.manual_unblock("9.9.9.9"));
    assert_eq!(common::send(&app, 200).await.status(), StatusCode::OK);
    assert!(guard.stats().blocked_keys.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unblock_then_reblock_survives_old_timer() {
    let guard = Arc::new(AbuseGuard::default());
    let app = common::guarded_app(guard.clone(), [1, 2, 3, 4]);

    guard.manual_block("1.2.3.4");
    tokio::time::sleep(Duration::from_secs(5 * 60)).await;
    guard.manual_unblock("1.2.3.4");

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    for _ in 0..10 {
        common::send(&app, 404).await;
    }

    // Past the first block's original deadline
    tokio::time::sleep(Duration::from_secs(16 * 60)).await;
    assert!(guard.is_blocked("1.2.3.4"));
    assert_eq!(common::send(&app, 200).await.status(), StatusCode::FORBIDDEN);
}
