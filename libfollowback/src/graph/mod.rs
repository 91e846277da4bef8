//! Remote social graph abstraction and implementations
//!
//! The sync engine only talks to the service through [`SocialGraph`]. Each
//! implementation is responsible for translating its raw failures into
//! [`ServiceError`](crate::error::ServiceError) so the retry layer can tell
//! rate limiting apart from everything else.
//!
//! # Examples
//!
//! ```no_run
//! use libfollowback::graph::{bluesky::BlueskyClient, SocialGraph};
//! use libfollowback::Credentials;
//!
//! # async fn example() -> libfollowback::Result<()> {
//! let client = BlueskyClient::new("https://bsky.social")?;
//! let creds = Credentials::from_env();
//!
//! let session = client.login(&creds.identifier, &creds.password).await?;
//! let page = client.get_followers(&session, &session.did, 100, None).await?;
//! println!("First page: {} followers", page.items.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;
use crate::types::{Account, FollowRecord, Page, Profile, Session};

pub mod bluesky;

// Available outside tests so integration tests can drive the engine
pub mod mock;

/// Which side of the follow graph to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Accounts following the actor
    Followers,
    /// Accounts the actor follows
    Follows,
}

impl ListKind {
    /// Operation label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            ListKind::Followers => "getFollowers",
            ListKind::Follows => "getFollows",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListKind::Followers => write!(f, "followers"),
            ListKind::Follows => write!(f, "following"),
        }
    }
}

/// Operations the follow-back engine needs from the remote service
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Service name for log output (e.g. "bluesky")
    fn name(&self) -> &str;

    /// Create a session
    ///
    /// # Errors
    ///
    /// `ServiceError::Authentication` for rejected credentials, or any other
    /// `ServiceError` for transport and service failures.
    async fn login(&self, identifier: &str, password: &SecretString) -> Result<Session>;

    /// Look up a profile by handle or DID
    async fn get_profile(&self, session: &Session, actor: &str) -> Result<Profile>;

    /// One page of accounts following `actor`
    async fn get_followers(
        &self,
        session: &Session,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>>;

    /// One page of accounts `actor` follows
    async fn get_follows(
        &self,
        session: &Session,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>>;

    /// Follow the account identified by `did`
    async fn follow(&self, session: &Session, did: &str) -> Result<FollowRecord>;

    /// Dispatch to [`get_followers`](Self::get_followers) or
    /// [`get_follows`](Self::get_follows)
    async fn list(
        &self,
        kind: ListKind,
        session: &Session,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>> {
        match kind {
            ListKind::Followers => self.get_followers(session, actor, limit, cursor).await,
            ListKind::Follows => self.get_follows(session, actor, limit, cursor).await,
        }
    }
}
