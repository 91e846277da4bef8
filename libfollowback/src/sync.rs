//! Follow-back orchestration
//!
//! A run moves through a fixed sequence of phases:
//!
//! ```text
//! Idle -> Authenticating -> ResolvingIdentity -> FetchingFollowers
//!      -> FetchingFollowing -> Reconciling -> FollowLoop -> Reporting -> Done
//! ```
//!
//! Failures before the follow loop end the run with an error. Inside the
//! follow loop a failure only affects the follower being processed; it is
//! logged and counted, and the loop moves on.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::Result;
use crate::graph::SocialGraph;
use crate::paginator::Paginator;
use crate::retry::BackoffExecutor;
use crate::types::{FollowerSet, FollowingIndex, RunStats, Session};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Authenticating,
    ResolvingIdentity,
    FetchingFollowers,
    FetchingFollowing,
    Reconciling,
    FollowLoop,
    Reporting,
    Done,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::ResolvingIdentity => "resolving identity",
            SyncPhase::FetchingFollowers => "fetching followers",
            SyncPhase::FetchingFollowing => "fetching following",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::FollowLoop => "following",
            SyncPhase::Reporting => "reporting",
            SyncPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Tuning for a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Accounts requested per listing page
    pub page_limit: u32,
    /// Pause after each page and after each successful follow
    pub delay: Duration,
    /// Log who would be followed without following anyone
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_limit: crate::config::MAX_PAGE_LIMIT,
            delay: Duration::from_secs(1),
            dry_run: false,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_limit: config.sync.page_limit,
            delay: config.sync.delay(),
            dry_run: config.sync.dry_run,
        }
    }
}

/// Follows back every follower the account does not already follow
pub struct FollowBack<'a, G: SocialGraph + ?Sized> {
    graph: &'a G,
    executor: BackoffExecutor,
    options: SyncOptions,
    phase: SyncPhase,
}

impl<'a, G: SocialGraph + ?Sized> FollowBack<'a, G> {
    pub fn new(graph: &'a G, executor: BackoffExecutor, options: SyncOptions) -> Self {
        Self {
            graph,
            executor,
            options,
            phase: SyncPhase::Idle,
        }
    }

    /// Build with the retry policy and sync settings from `config`
    pub fn from_config(graph: &'a G, config: &Config) -> Self {
        Self::new(
            graph,
            BackoffExecutor::new(config.retry.policy()),
            SyncOptions::from_config(config),
        )
    }

    /// Current phase; after a failed run, the phase that failed
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("Phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Run the whole follow-back pass
    ///
    /// # Errors
    ///
    /// Returns the underlying service error if login, profile lookup, or
    /// either listing fails after retries. Individual follow failures are
    /// reported in [`RunStats::failed`] instead.
    pub async fn run(&mut self, credentials: &Credentials) -> Result<RunStats> {
        let graph = self.graph;

        self.enter(SyncPhase::Authenticating);
        info!("Logging in to {} as {}...", graph.name(), credentials.identifier);
        let session = self
            .executor
            .execute("login", || {
                graph.login(&credentials.identifier, &credentials.password)
            })
            .await?;
        info!("Login successful");

        self.enter(SyncPhase::ResolvingIdentity);
        let profile = self
            .executor
            .execute("getProfile", || {
                graph.get_profile(&session, &credentials.identifier)
            })
            .await?;
        let actor = profile.did;
        debug!("Resolved {} to {}", credentials.identifier, actor);

        self.enter(SyncPhase::FetchingFollowers);
        info!("Fetching followers...");
        let followers = self
            .paginator()
            .collect_followers(graph, &session, &actor)
            .await?;
        info!("Found {} total followers", followers.len());

        self.enter(SyncPhase::FetchingFollowing);
        info!("Fetching following list...");
        let following = self
            .paginator()
            .collect_following(graph, &session, &actor)
            .await?;
        info!("Found {} accounts you're following", following.len());

        self.enter(SyncPhase::Reconciling);
        let pending = followers
            .iter()
            .filter(|follower| !following.contains(&follower.did))
            .count();
        info!("{} follower(s) not yet followed back", pending);

        self.enter(SyncPhase::FollowLoop);
        if self.options.dry_run {
            info!("Dry run: no follows will be created");
        } else {
            info!("Starting follow operations...");
        }
        let stats = self.follow_loop(&session, &followers, &following).await;

        self.enter(SyncPhase::Reporting);
        info!(
            followed = stats.followed,
            skipped = stats.skipped,
            failed = stats.failed,
            total = stats.total,
            "Run complete"
        );

        self.enter(SyncPhase::Done);
        Ok(stats)
    }

    fn paginator(&self) -> Paginator<'_> {
        Paginator::new(&self.executor, self.options.page_limit, self.options.delay)
    }

    async fn follow_loop(
        &self,
        session: &Session,
        followers: &FollowerSet,
        following: &FollowingIndex,
    ) -> RunStats {
        let graph = self.graph;
        let mut stats = RunStats {
            total: followers.len(),
            dry_run: self.options.dry_run,
            ..RunStats::default()
        };

        for follower in followers {
            if following.contains(&follower.did) {
                stats.skipped += 1;
                continue;
            }

            if self.options.dry_run {
                stats.followed += 1;
                info!("Would follow {} ({})", follower.handle, follower.did);
                continue;
            }

            let result = self
                .executor
                .execute("follow", || graph.follow(session, &follower.did))
                .await;

            match result {
                Ok(record) => {
                    stats.followed += 1;
                    debug!("Follow record: {}", record.uri);
                    info!(
                        "Followed {} ({} new follows)",
                        follower.handle, stats.followed
                    );
                    sleep(self.options.delay).await;
                }
                Err(e) => {
                    stats.failed += 1;
                    error!("Failed to follow {}: {}", follower.handle, e);
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::graph::mock::{MockGraph, MockOp};
    use crate::types::Account;

    fn credentials() -> Credentials {
        Credentials::new("me.bsky.social", "app-password")
    }

    fn quick_options() -> SyncOptions {
        SyncOptions {
            delay: Duration::ZERO,
            ..SyncOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run_ends_done() {
        let graph = MockGraph::new()
            .with_followers(vec![Account::new("did:plc:1", "a")])
            .with_follows(vec![]);
        let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), quick_options());
        assert_eq!(sync.phase(), SyncPhase::Idle);

        let stats = sync.run(&credentials()).await.unwrap();

        assert_eq!(sync.phase(), SyncPhase::Done);
        assert_eq!(stats.followed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_phase_is_reported() {
        let graph = MockGraph::new().fail_always(
            MockOp::GetProfile,
            ServiceError::Status {
                status: 400,
                error: Some("InvalidRequest".to_string()),
                message: "Profile not found".to_string(),
            },
        );
        let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), quick_options());

        let result = sync.run(&credentials()).await;

        assert!(result.is_err());
        assert_eq!(sync.phase(), SyncPhase::ResolvingIdentity);
        assert_eq!(graph.call_count(MockOp::GetProfile), 3);
        assert_eq!(graph.call_count(MockOp::GetFollowers), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_lookup_uses_login_identifier() {
        let graph = MockGraph::new();
        let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), quick_options());

        sync.run(&credentials()).await.unwrap();

        assert!(graph.calls().contains(&crate::graph::mock::MockCall::GetProfile {
            actor: "me.bsky.social".to_string()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_issues_no_follows() {
        let graph = MockGraph::new()
            .with_followers(vec![
                Account::new("did:plc:1", "a"),
                Account::new("did:plc:2", "b"),
            ])
            .with_follows(vec![Account::new("did:plc:1", "a")]);
        let options = SyncOptions {
            dry_run: true,
            ..quick_options()
        };
        let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options);

        let stats = sync.run(&credentials()).await.unwrap();

        assert!(stats.dry_run);
        assert_eq!(stats.followed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(graph.call_count(MockOp::Follow), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_after_each_successful_follow() {
        let graph = MockGraph::new().with_followers(vec![
            Account::new("did:plc:1", "a"),
            Account::new("did:plc:2", "b"),
        ]);
        let options = SyncOptions {
            delay: Duration::from_secs(1),
            ..SyncOptions::default()
        };
        let mut sync = FollowBack::new(&graph, BackoffExecutor::default(), options);
        let started = tokio::time::Instant::now();

        sync.run(&credentials()).await.unwrap();

        // one followers page + one follows page + two follows
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.sync.page_limit = 25;
        config.sync.delay_ms = 10;
        config.sync.dry_run = true;

        let options = SyncOptions::from_config(&config);
        assert_eq!(options.page_limit, 25);
        assert_eq!(options.delay, Duration::from_millis(10));
        assert!(options.dry_run);
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_applies_retry_policy() {
        let mut config = Config::default();
        config.retry.max_retries = 2;
        config.sync.delay_ms = 0;
        let graph = MockGraph::new().fail_always(
            MockOp::Login,
            ServiceError::Network("connection refused".to_string()),
        );
        let mut sync = FollowBack::from_config(&graph, &config);

        assert!(sync.run(&credentials()).await.is_err());
        assert_eq!(graph.call_count(MockOp::Login), 2);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SyncPhase::FetchingFollowers.to_string(), "fetching followers");
        assert_eq!(SyncPhase::Authenticating.to_string(), "authenticating");
    }
}
