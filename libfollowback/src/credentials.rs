//! Account credentials
//!
//! Credentials come from the process environment (`BSKY_USERNAME`,
//! `BSKY_PASSWORD`); a `.env` file is not read. Missing values are not
//! rejected here. They are passed through as empty strings and the service
//! refuses them at login.

use secrecy::SecretString;

pub const USERNAME_VAR: &str = "BSKY_USERNAME";
pub const PASSWORD_VAR: &str = "BSKY_PASSWORD";

/// Login identifier and app password
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Handle or email used to log in
    pub identifier: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Read credentials from the environment
    pub fn from_env() -> Self {
        let identifier = std::env::var(USERNAME_VAR).unwrap_or_default();
        let password = std::env::var(PASSWORD_VAR).unwrap_or_default();

        if identifier.is_empty() {
            tracing::warn!("{} is not set; login will likely fail", USERNAME_VAR);
        }
        if password.is_empty() {
            tracing::warn!("{} is not set; login will likely fail", PASSWORD_VAR);
        }

        Self::new(identifier, password)
    }
}
