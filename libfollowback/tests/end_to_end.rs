//! End-to-end follow-back runs against the mock social graph
//!
//! These tests drive the full pipeline:
//! - Login and identity resolution
//! - Follower and following pagination
//! - Follow loop with skips and per-account failures
//! - Fatal failures before the follow loop

use anyhow::Result;
use libfollowback::graph::mock::{MockGraph, MockOp};
use libfollowback::retry::{BackoffExecutor, RetryPolicy};
use libfollowback::sync::{FollowBack, SyncOptions, SyncPhase};
use libfollowback::types::Account;
use libfollowback::{Credentials, FollowbackError, ServiceError};
use std::time::Duration;

fn credentials() -> Credentials {
    Credentials::new("me.bsky.social", "app-password")
}

fn options() -> SyncOptions {
    SyncOptions {
        delay: Duration::from_secs(1),
        ..SyncOptions::default()
    }
}

fn permanent_failure() -> ServiceError {
    ServiceError::Status {
        status: 400,
        error: Some("InvalidRequest".to_string()),
        message: "Could not follow: blocked by actor".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_follows_only_unfollowed_followers() -> Result<()> {
    let graph = MockGraph::new()
        .with_followers(vec![Account::new("1", "a"), Account::new("2", "b")])
        .with_follows(vec![Account::new("1", "a")]);

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let stats = sync.run(&credentials()).await?;

    assert_eq!(graph.follow_attempts(), vec!["2"]);
    assert_eq!(stats.followed, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.total, 2);
    assert_eq!(sync.phase(), SyncPhase::Done);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_already_followed_accounts_never_followed_across_pages() -> Result<()> {
    let followers: Vec<Vec<Account>> = (0..5)
        .map(|page| {
            (0..3)
                .map(|i| {
                    let n = page * 3 + i;
                    Account::new(format!("did:plc:{}", n), format!("user{}", n))
                })
                .collect()
        })
        .collect();
    // Already following every even-numbered follower, spread over pages
    let follows: Vec<Vec<Account>> = (0..15)
        .filter(|n| n % 2 == 0)
        .map(|n| Account::new(format!("did:plc:{}", n), format!("user{}", n)))
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|chunk| chunk.to_vec())
        .collect();

    let graph = MockGraph::new()
        .with_follower_pages(followers)
        .with_follow_pages(follows);

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let stats = sync.run(&credentials()).await?;

    let attempted = graph.follow_attempts();
    assert_eq!(attempted.len(), 7);
    for did in &attempted {
        let n: u32 = did.trim_start_matches("did:plc:").parse()?;
        assert_eq!(n % 2, 1, "followed an already-followed account: {}", did);
    }

    assert_eq!(stats.followed, 7);
    assert_eq!(stats.skipped, 8);
    assert_eq!(stats.total, 15);
    assert_eq!(graph.call_count(MockOp::GetFollowers), 5);
    assert_eq!(graph.call_count(MockOp::GetFollows), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_follow_does_not_stop_run() -> Result<()> {
    let graph = MockGraph::new()
        .with_followers(vec![
            Account::new("did:plc:a", "a"),
            Account::new("did:plc:b", "b"),
            Account::new("did:plc:c", "c"),
        ])
        .fail_follow("did:plc:b", permanent_failure());

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let stats = sync.run(&credentials()).await?;

    // b was retried up to the limit, then the loop moved on to c
    assert_eq!(
        graph.follow_attempts(),
        vec!["did:plc:a", "did:plc:b", "did:plc:b", "did:plc:b", "did:plc:c"]
    );
    assert_eq!(stats.followed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.total, 3);
    assert_eq!(sync.phase(), SyncPhase::Done);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_login_failure_is_fatal() -> Result<()> {
    let graph = MockGraph::new()
        .with_followers(vec![Account::new("did:plc:a", "a")])
        .fail_always(
            MockOp::Login,
            ServiceError::Authentication("Invalid identifier or password".to_string()),
        );

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let result = sync.run(&credentials()).await;

    let error = result.expect_err("login should fail");
    match &error {
        FollowbackError::Service(ServiceError::Authentication(msg)) => {
            assert!(msg.contains("Invalid identifier or password"));
        }
        other => panic!("Expected authentication error, got {:?}", other),
    }
    assert_eq!(error.exit_code(), 1);

    assert_eq!(graph.call_count(MockOp::Login), 3);
    assert_eq!(graph.call_count(MockOp::GetProfile), 0);
    assert_eq!(graph.call_count(MockOp::GetFollowers), 0);
    assert_eq!(graph.call_count(MockOp::GetFollows), 0);
    assert_eq!(graph.call_count(MockOp::Follow), 0);
    assert_eq!(sync.phase(), SyncPhase::Authenticating);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pagination_failure_is_fatal() -> Result<()> {
    let graph = MockGraph::new()
        .with_followers(vec![Account::new("did:plc:a", "a")])
        .fail_always(
            MockOp::GetFollows,
            ServiceError::Network("connection reset".to_string()),
        );

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let result = sync.run(&credentials()).await;

    assert!(matches!(
        result,
        Err(FollowbackError::Service(ServiceError::Network(_)))
    ));
    assert_eq!(sync.phase(), SyncPhase::FetchingFollowing);
    assert_eq!(graph.call_count(MockOp::GetFollows), 3);
    assert_eq!(graph.call_count(MockOp::Follow), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_follow_waits_and_completes() -> Result<()> {
    let rate_limited = ServiceError::RateLimit {
        message: "Rate Limit Exceeded".to_string(),
        reset_after: Some(Duration::from_secs(300)),
    };
    let graph = MockGraph::new()
        .with_followers(vec![
            Account::new("did:plc:a", "a"),
            Account::new("did:plc:b", "b"),
        ])
        .fail_times(MockOp::Follow, vec![rate_limited.clone(), rate_limited]);

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let started = tokio::time::Instant::now();
    let stats = sync.run(&credentials()).await?;

    assert_eq!(stats.followed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(
        graph.follow_attempts(),
        vec!["did:plc:a", "did:plc:a", "did:plc:a", "did:plc:b"]
    );
    assert!(started.elapsed() >= Duration::from_secs(2 * 15 * 60));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_capped_rate_limit_waits_count_as_follow_failure() -> Result<()> {
    let graph = MockGraph::new()
        .with_followers(vec![
            Account::new("did:plc:a", "a"),
            Account::new("did:plc:b", "b"),
        ])
        .fail_follow(
            "did:plc:a",
            ServiceError::RateLimit {
                message: "Rate Limit Exceeded".to_string(),
                reset_after: None,
            },
        );

    let executor = BackoffExecutor::new(RetryPolicy {
        max_rate_limit_waits: Some(1),
        ..RetryPolicy::default()
    });
    let mut sync = FollowBack::new(&graph, executor, options());
    let stats = sync.run(&credentials()).await?;

    assert_eq!(stats.followed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        graph.follow_attempts(),
        vec!["did:plc:a", "did:plc:a", "did:plc:b"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_followers_reports_zero() -> Result<()> {
    let graph = MockGraph::new().with_follows(vec![Account::new("did:plc:x", "x")]);

    let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options());
    let stats = sync.run(&credentials()).await?;

    assert_eq!(stats.followed, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.total, 0);
    assert_eq!(graph.call_count(MockOp::Follow), 0);
    Ok(())
}
