//! Bluesky (AT Protocol) implementation over XRPC

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{FollowbackError, Result, ServiceError};
use crate::graph::SocialGraph;
use crate::types::{Account, FollowRecord, Page, Profile, Session};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";
const RATELIMIT_RESET: &str = "ratelimit-reset";

/// XRPC error body: `{"error": "...", "message": "..."}`
#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Body of both `createSession` and `refreshSession`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    refresh_jwt: String,
    handle: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct FollowersResponse {
    followers: Vec<Account>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowsResponse {
    follows: Vec<Account>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FollowRecordData<'a> {
    #[serde(rename = "$type")]
    record_type: &'static str,
    subject: &'a str,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'static str,
    record: FollowRecordData<'a>,
}

/// Translate a non-success XRPC response into a classified [`ServiceError`]
///
/// This is the only place that looks at status codes and error text. Rate
/// limiting is recognized by status 429, the `RateLimitExceeded` error code,
/// or a message mentioning "rate limit". The `ExpiredToken` code is kept
/// apart from other auth failures so the client can refresh the session.
///
/// # Arguments
///
/// * `status` - HTTP status code
/// * `body` - Raw response body (JSON error object or plain text)
/// * `reset_after` - Advisory wait parsed from the response headers
/// * `context` - Operation name, e.g. "getFollowers"
pub fn map_xrpc_error(
    status: u16,
    body: &str,
    reset_after: Option<Duration>,
    context: &str,
) -> ServiceError {
    let parsed: XrpcErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error;
    let message = parsed
        .message
        .or_else(|| code.clone())
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown error")
                .to_string()
        });

    let code_is = |candidates: &[&str]| {
        code.as_deref()
            .map(|c| candidates.contains(&c))
            .unwrap_or(false)
    };

    if status == 429
        || code_is(&["RateLimitExceeded"])
        || message.to_lowercase().contains("rate limit")
    {
        return ServiceError::RateLimit {
            message: format!("{} (during {})", message, context),
            reset_after,
        };
    }

    if code_is(&["ExpiredToken"]) {
        return ServiceError::ExpiredToken(format!(
            "Bluesky session expired during {}: {}",
            context, message
        ));
    }

    if status == 401
        || code_is(&[
            "AuthenticationRequired",
            "InvalidToken",
            "AuthFactorTokenRequired",
        ])
    {
        return ServiceError::Authentication(format!(
            "Bluesky rejected credentials during {}: {}",
            context, message
        ));
    }

    ServiceError::Status {
        status,
        error: code,
        message: format!("Bluesky {} failed: {}", context, message),
    }
}

fn map_transport_error(error: reqwest::Error, context: &str) -> ServiceError {
    if error.is_decode() {
        return ServiceError::Decode(format!(
            "Could not decode Bluesky {} response: {}",
            context, error
        ));
    }

    ServiceError::Network(format!(
        "Network error while contacting Bluesky during {}: {}",
        context, error
    ))
}

/// Advisory wait from `ratelimit-reset` (unix seconds) or `Retry-After`
/// (delta seconds)
///
/// Returns `None` when neither header is present or parseable.
pub fn rate_limit_reset(headers: &HeaderMap, now_unix: i64) -> Option<Duration> {
    let header_secs = |name: &str| -> Option<i64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(reset_at) = header_secs(RATELIMIT_RESET) {
        let remaining = reset_at.saturating_sub(now_unix).max(0);
        return Some(Duration::from_secs(remaining as u64));
    }

    header_secs(RETRY_AFTER.as_str())
        .filter(|secs| *secs >= 0)
        .map(|secs| Duration::from_secs(secs as u64))
}

/// Tokens issued by `refreshSession`
#[derive(Debug, Clone)]
struct SessionTokens {
    access_jwt: SecretString,
    refresh_jwt: SecretString,
}

/// Bluesky client speaking XRPC to a PDS or entryway
///
/// An expired access token is refreshed on demand. The refreshed tokens are
/// kept by the client and take precedence over the ones in the [`Session`]
/// passed to later calls, until the next login.
#[derive(Debug, Clone)]
pub struct BlueskyClient {
    http: Client,
    service_url: String,
    refreshed: Arc<Mutex<Option<SessionTokens>>>,
}

impl BlueskyClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `service_url` - Base URL, e.g. "https://bsky.social"
    pub fn new(service_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("followback/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(http, service_url))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(http: Client, service_url: &str) -> Self {
        Self {
            http,
            service_url: service_url.trim_end_matches('/').to_string(),
            refreshed: Arc::new(Mutex::new(None)),
        }
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, nsid)
    }

    async fn access_token(&self, session: &Session) -> SecretString {
        match &*self.refreshed.lock().await {
            Some(tokens) => tokens.access_jwt.clone(),
            None => session.access_jwt.clone(),
        }
    }

    /// Send a request built around the current access token
    ///
    /// On `ExpiredToken` the session is refreshed and the request is sent
    /// once more with the new token.
    async fn send_authed<T, F>(&self, session: &Session, context: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token(session).await;

        match self.send(build(token.expose_secret()), context).await {
            Err(FollowbackError::Service(ServiceError::ExpiredToken(message))) => {
                tracing::info!("Access token expired during {}, refreshing session", context);
                tracing::debug!("{}", message);
                let token = self.refresh_session(session, &token).await?;
                self.send(build(token.expose_secret()), context).await
            }
            other => other,
        }
    }

    /// Exchange the refresh token for new tokens and return the new access token
    ///
    /// `stale` is the access token that was rejected. If another call already
    /// replaced it, that newer token is returned without refreshing again.
    async fn refresh_session(&self, session: &Session, stale: &SecretString) -> Result<SecretString> {
        let mut refreshed = self.refreshed.lock().await;

        let refresh_jwt = match refreshed.as_ref() {
            Some(tokens) if tokens.access_jwt.expose_secret() != stale.expose_secret() => {
                return Ok(tokens.access_jwt.clone());
            }
            Some(tokens) => tokens.refresh_jwt.clone(),
            None => session.refresh_jwt.clone(),
        };

        let request = self
            .http
            .post(self.endpoint("com.atproto.server.refreshSession"))
            .bearer_auth(refresh_jwt.expose_secret());
        let response: CreateSessionResponse = self.send(request, "refreshSession").await?;
        tracing::debug!("Bluesky session refreshed for {}", response.did);

        let access_jwt = SecretString::from(response.access_jwt);
        *refreshed = Some(SessionTokens {
            access_jwt: access_jwt.clone(),
            refresh_jwt: SecretString::from(response.refresh_jwt),
        });
        Ok(access_jwt)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<T>()
                .await
                .map_err(|e| map_transport_error(e, context))?;
            return Ok(body);
        }

        let reset_after = rate_limit_reset(response.headers(), chrono::Utc::now().timestamp());
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("Bluesky {} returned {}: {}", context, status, body);

        Err(map_xrpc_error(status.as_u16(), &body, reset_after, context).into())
    }

    async fn list_page<R: DeserializeOwned>(
        &self,
        session: &Session,
        nsid: &str,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<R> {
        let mut query = vec![("actor", actor.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        self.send_authed(session, nsid, |token| {
            self.http
                .get(self.endpoint(nsid))
                .bearer_auth(token)
                .query(&query)
        })
        .await
    }
}

#[async_trait]
impl SocialGraph for BlueskyClient {
    fn name(&self) -> &str {
        "bluesky"
    }

    async fn login(&self, identifier: &str, password: &SecretString) -> Result<Session> {
        tracing::debug!("Creating Bluesky session for {}", identifier);

        let request = self
            .http
            .post(self.endpoint("com.atproto.server.createSession"))
            .json(&serde_json::json!({
                "identifier": identifier,
                "password": password.expose_secret(),
            }));

        let response: CreateSessionResponse = self.send(request, "createSession").await?;
        tracing::debug!("Bluesky session created for {}", response.did);
        *self.refreshed.lock().await = None;

        Ok(Session {
            did: response.did,
            handle: response.handle,
            access_jwt: SecretString::from(response.access_jwt),
            refresh_jwt: SecretString::from(response.refresh_jwt),
        })
    }

    async fn get_profile(&self, session: &Session, actor: &str) -> Result<Profile> {
        self.send_authed(session, "getProfile", |token| {
            self.http
                .get(self.endpoint("app.bsky.actor.getProfile"))
                .bearer_auth(token)
                .query(&[("actor", actor)])
        })
        .await
    }

    async fn get_followers(
        &self,
        session: &Session,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>> {
        let response: FollowersResponse = self
            .list_page(session, "app.bsky.graph.getFollowers", actor, limit, cursor)
            .await?;
        Ok(Page::new(response.followers, response.cursor))
    }

    async fn get_follows(
        &self,
        session: &Session,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>> {
        let response: FollowsResponse = self
            .list_page(session, "app.bsky.graph.getFollows", actor, limit, cursor)
            .await?;
        Ok(Page::new(response.follows, response.cursor))
    }

    async fn follow(&self, session: &Session, did: &str) -> Result<FollowRecord> {
        let body = CreateRecordRequest {
            repo: &session.did,
            collection: FOLLOW_COLLECTION,
            record: FollowRecordData {
                record_type: FOLLOW_COLLECTION,
                subject: did,
                created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            },
        };

        let record: FollowRecord = self
            .send_authed(session, "createRecord", |token| {
                self.http
                    .post(self.endpoint("com.atproto.repo.createRecord"))
                    .bearer_auth(token)
                    .json(&body)
            })
            .await?;
        tracing::debug!("Created follow record {}", record.uri);
        Ok(record)
    }
}
