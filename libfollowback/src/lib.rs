//! followback - follow back your Bluesky followers
//!
//! This library provides the retry, pagination, and reconciliation engine
//! behind the `followback` tool. All network calls go through a single
//! backoff executor that handles transient failures and rate limiting.

pub mod config;
pub mod credentials;
pub mod error;
pub mod graph;
pub mod logging;
pub mod paginator;
pub mod retry;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::Credentials;
pub use error::{FollowbackError, Result, ServiceError};
pub use retry::{BackoffExecutor, RetryPolicy};
pub use sync::{FollowBack, SyncOptions, SyncPhase};
pub use types::{Account, Page, RunStats, Session};
