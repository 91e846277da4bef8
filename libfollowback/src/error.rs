//! Error types for followback

use std::time::Duration;

use thiserror::Error;

use crate::retry::{FailureClass, Retryable};

pub type Result<T> = std::result::Result<T, FollowbackError>;

#[derive(Error, Debug)]
pub enum FollowbackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

impl FollowbackError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            FollowbackError::Config(_) => 2,
            FollowbackError::Service(_) => 1,
        }
    }

    /// HTTP status reported by the remote service, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FollowbackError::Service(e) => e.status(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures surfaced by the remote social graph, already classified.
///
/// Raw transport and XRPC failures are translated into this enum at the
/// service boundary (see `graph::bluesky::map_xrpc_error`), so nothing past
/// that point inspects message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The access token is no longer accepted and the session must be refreshed
    #[error("Session expired: {0}")]
    ExpiredToken(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Advisory wait reported by the service (from `ratelimit-reset`)
        reset_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}: {message}")]
    Status {
        status: u16,
        /// XRPC error code, e.g. "InvalidRequest"
        error: Option<String>,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::RateLimit { .. } => Some(429),
            ServiceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ServiceError::RateLimit { .. })
    }
}

impl Retryable for ServiceError {
    fn failure_class(&self) -> FailureClass {
        match self {
            ServiceError::RateLimit { reset_after, .. } => FailureClass::RateLimited {
                reset_after: *reset_after,
            },
            ServiceError::Authentication(_)
            | ServiceError::ExpiredToken(_)
            | ServiceError::Network(_)
            | ServiceError::Status { .. }
            | ServiceError::Decode(_) => FailureClass::Transient,
        }
    }
}

impl Retryable for FollowbackError {
    fn failure_class(&self) -> FailureClass {
        match self {
            FollowbackError::Service(e) => e.failure_class(),
            FollowbackError::Config(_) => FailureClass::Transient,
        }
    }
}
