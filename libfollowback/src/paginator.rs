//! Cursor-driven collection of follower and follow listings
//!
//! Pages are requested one at a time, each through the [`BackoffExecutor`],
//! with a fixed delay after every page. Collection stops when the service
//! returns a page without a cursor. There is no page cap: a service that
//! keeps returning cursors keeps the loop running.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::Result;
use crate::graph::{ListKind, SocialGraph};
use crate::retry::BackoffExecutor;
use crate::types::{Account, FollowerSet, FollowingIndex, Session};

pub struct Paginator<'a> {
    executor: &'a BackoffExecutor,
    page_limit: u32,
    page_delay: Duration,
}

impl<'a> Paginator<'a> {
    /// # Arguments
    ///
    /// * `executor` - Retry wrapper applied to every page request
    /// * `page_limit` - Accounts requested per page
    /// * `page_delay` - Pause after each page
    pub fn new(executor: &'a BackoffExecutor, page_limit: u32, page_delay: Duration) -> Self {
        Self {
            executor,
            page_limit,
            page_delay,
        }
    }

    /// Every account following `actor`, in the order the service returned them
    ///
    /// # Errors
    ///
    /// Fails with the page request's last error once its retries are
    /// exhausted; accounts collected before that point are discarded.
    pub async fn collect_followers<G>(
        &self,
        graph: &G,
        session: &Session,
        actor: &str,
    ) -> Result<FollowerSet>
    where
        G: SocialGraph + ?Sized,
    {
        let mut followers = Vec::new();
        self.drive(graph, session, actor, ListKind::Followers, |items| {
            followers.extend(items);
            followers.len()
        })
        .await?;
        Ok(followers)
    }

    /// DIDs of every account `actor` follows
    pub async fn collect_following<G>(
        &self,
        graph: &G,
        session: &Session,
        actor: &str,
    ) -> Result<FollowingIndex>
    where
        G: SocialGraph + ?Sized,
    {
        let mut following = HashSet::new();
        self.drive(graph, session, actor, ListKind::Follows, |items| {
            following.extend(items.into_iter().map(|account| account.did));
            following.len()
        })
        .await?;
        Ok(following)
    }

    /// Request pages until the cursor runs out, handing each page's accounts
    /// to `accept`, which returns the running total. Returns the page count.
    async fn drive<G, F>(
        &self,
        graph: &G,
        session: &Session,
        actor: &str,
        kind: ListKind,
        mut accept: F,
    ) -> Result<usize>
    where
        G: SocialGraph + ?Sized,
        F: FnMut(Vec<Account>) -> usize,
    {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .executor
                .execute(kind.label(), || {
                    graph.list(kind, session, actor, self.page_limit, cursor.as_deref())
                })
                .await?;
            pages += 1;

            let next = page.next_cursor().map(str::to_string);
            let total = accept(page.items);
            info!("Fetched {} {} so far...", total, kind);

            sleep(self.page_delay).await;

            match next {
                Some(next) => cursor = Some(next),
                None => {
                    debug!("{} listing complete after {} page(s)", kind, pages);
                    return Ok(pages);
                }
            }
        }
    }
}
