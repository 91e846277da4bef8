//! Core types for followback

use std::collections::HashSet;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A remote account as returned by follower/follow listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Durable identifier (e.g. "did:plc:abc123")
    pub did: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Account {
    pub fn new(did: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            display_name: None,
        }
    }
}

/// Followers in the order the service returned them
pub type FollowerSet = Vec<Account>;

/// DIDs of accounts the caller already follows
pub type FollowingIndex = HashSet<String>;

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self { items, cursor }
    }

    /// Final page: no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }

    /// Continuation token, if the listing has more pages.
    ///
    /// An empty cursor is treated the same as an absent one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Authenticated session handle
///
/// Created by login and passed by reference to every later call.
#[derive(Debug, Clone)]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: SecretString,
    pub refresh_jwt: SecretString,
}

/// The caller's own profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
    #[serde(default)]
    pub follows_count: Option<u64>,
}

/// Reference to a created follow record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRecord {
    pub uri: String,
    pub cid: String,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Follows issued successfully (or that would be issued, in dry-run mode)
    pub followed: usize,
    /// Followers already followed
    pub skipped: usize,
    /// Follows that failed after exhausting retries
    pub failed: usize,
    /// Total followers processed
    pub total: usize,
    #[serde(default)]
    pub dry_run: bool,
}
