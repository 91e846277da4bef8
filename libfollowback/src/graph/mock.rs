//! Scripted in-memory social graph for testing
//!
//! `MockGraph` serves followers and follows from pre-built pages, records
//! every call it receives, and can be told to fail specific operations
//! (once, a fixed number of times, or permanently). No network access or
//! credentials are needed.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{Result, ServiceError};
use crate::graph::SocialGraph;
use crate::types::{Account, FollowRecord, Page, Profile, Session};

/// DID the mock assigns to the logged-in account
pub const MOCK_SELF_DID: &str = "did:plc:mock-self";

/// Operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Login,
    GetProfile,
    GetFollowers,
    GetFollows,
    Follow,
}

/// A call received by the mock, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Login { identifier: String },
    GetProfile { actor: String },
    GetFollowers { actor: String, cursor: Option<String> },
    GetFollows { actor: String, cursor: Option<String> },
    Follow { did: String },
}

#[derive(Default)]
struct Failures {
    /// Errors returned before the operation starts succeeding
    queued: HashMap<MockOp, VecDeque<ServiceError>>,
    /// Errors returned on every call
    always: HashMap<MockOp, ServiceError>,
    /// Follow errors returned for specific DIDs on every call
    follow_by_did: HashMap<String, ServiceError>,
}

/// Mock social graph
#[derive(Default)]
pub struct MockGraph {
    follower_pages: Vec<Vec<Account>>,
    follow_pages: Vec<Vec<Account>>,
    failures: Mutex<Failures>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `followers` as a single page
    pub fn with_followers(mut self, followers: Vec<Account>) -> Self {
        self.follower_pages = vec![followers];
        self
    }

    /// Serve followers split into the given pages
    pub fn with_follower_pages(mut self, pages: Vec<Vec<Account>>) -> Self {
        self.follower_pages = pages;
        self
    }

    /// Serve `follows` as a single page
    pub fn with_follows(mut self, follows: Vec<Account>) -> Self {
        self.follow_pages = vec![follows];
        self
    }

    /// Serve follows split into the given pages
    pub fn with_follow_pages(mut self, pages: Vec<Vec<Account>>) -> Self {
        self.follow_pages = pages;
        self
    }

    /// Fail the next `errors.len()` calls to `op` with these errors, in order
    pub fn fail_times(self, op: MockOp, errors: Vec<ServiceError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .queued
            .entry(op)
            .or_default()
            .extend(errors);
        self
    }

    /// Fail every call to `op`
    pub fn fail_always(self, op: MockOp, error: ServiceError) -> Self {
        self.failures.lock().unwrap().always.insert(op, error);
        self
    }

    /// Fail every follow of `did`
    pub fn fail_follow(self, did: &str, error: ServiceError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .follow_by_did
            .insert(did.to_string(), error);
        self
    }

    /// All calls received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls to `op`
    pub fn call_count(&self, op: MockOp) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call_op(call) == op)
            .count()
    }

    /// DIDs passed to `follow`, including failed attempts
    pub fn follow_attempts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                MockCall::Follow { did } => Some(did.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(&self, op: MockOp) -> Option<ServiceError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(error) = failures.always.get(&op) {
            return Some(error.clone());
        }
        failures.queued.get_mut(&op).and_then(|q| q.pop_front())
    }

    fn serve_page(&self, pages: &[Vec<Account>], cursor: Option<&str>) -> Result<Page<Account>> {
        let index = match cursor {
            None => 0,
            Some(c) => parse_cursor(c)?,
        };

        if pages.is_empty() && index == 0 {
            return Ok(Page::last(Vec::new()));
        }

        let items = pages.get(index).cloned().ok_or_else(|| ServiceError::Status {
            status: 400,
            error: Some("InvalidRequest".to_string()),
            message: format!("Cursor out of range: {}", index),
        })?;

        let next = if index + 1 < pages.len() {
            Some(format!("cursor-{}", index + 1))
        } else {
            None
        };

        Ok(Page::new(items, next))
    }
}

fn call_op(call: &MockCall) -> MockOp {
    match call {
        MockCall::Login { .. } => MockOp::Login,
        MockCall::GetProfile { .. } => MockOp::GetProfile,
        MockCall::GetFollowers { .. } => MockOp::GetFollowers,
        MockCall::GetFollows { .. } => MockOp::GetFollows,
        MockCall::Follow { .. } => MockOp::Follow,
    }
}

fn parse_cursor(cursor: &str) -> Result<usize> {
    cursor
        .strip_prefix("cursor-")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            ServiceError::Status {
                status: 400,
                error: Some("InvalidRequest".to_string()),
                message: format!("Malformed cursor: {}", cursor),
            }
            .into()
        })
}

#[async_trait]
impl SocialGraph for MockGraph {
    fn name(&self) -> &str {
        "mock"
    }

    async fn login(&self, identifier: &str, password: &SecretString) -> Result<Session> {
        self.record(MockCall::Login {
            identifier: identifier.to_string(),
        });

        if let Some(error) = self.take_failure(MockOp::Login) {
            return Err(error.into());
        }

        if identifier.is_empty() || password.expose_secret().is_empty() {
            return Err(ServiceError::Status {
                status: 400,
                error: Some("InvalidRequest".to_string()),
                message: "Input/identifier and password are required".to_string(),
            }
            .into());
        }

        Ok(Session {
            did: MOCK_SELF_DID.to_string(),
            handle: identifier.to_string(),
            access_jwt: SecretString::from("mock-access-jwt".to_string()),
            refresh_jwt: SecretString::from("mock-refresh-jwt".to_string()),
        })
    }

    async fn get_profile(&self, session: &Session, actor: &str) -> Result<Profile> {
        self.record(MockCall::GetProfile {
            actor: actor.to_string(),
        });

        if let Some(error) = self.take_failure(MockOp::GetProfile) {
            return Err(error.into());
        }

        Ok(Profile {
            did: session.did.clone(),
            handle: session.handle.clone(),
            display_name: None,
            followers_count: Some(self.follower_pages.iter().map(Vec::len).sum::<usize>() as u64),
            follows_count: Some(self.follow_pages.iter().map(Vec::len).sum::<usize>() as u64),
        })
    }

    async fn get_followers(
        &self,
        _session: &Session,
        actor: &str,
        _limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>> {
        self.record(MockCall::GetFollowers {
            actor: actor.to_string(),
            cursor: cursor.map(str::to_string),
        });

        if let Some(error) = self.take_failure(MockOp::GetFollowers) {
            return Err(error.into());
        }

        self.serve_page(&self.follower_pages, cursor)
    }

    async fn get_follows(
        &self,
        _session: &Session,
        actor: &str,
        _limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Account>> {
        self.record(MockCall::GetFollows {
            actor: actor.to_string(),
            cursor: cursor.map(str::to_string),
        });

        if let Some(error) = self.take_failure(MockOp::GetFollows) {
            return Err(error.into());
        }

        self.serve_page(&self.follow_pages, cursor)
    }

    async fn follow(&self, session: &Session, did: &str) -> Result<FollowRecord> {
        self.record(MockCall::Follow {
            did: did.to_string(),
        });

        if let Some(error) = self.failures.lock().unwrap().follow_by_did.get(did).cloned() {
            return Err(error.into());
        }
        if let Some(error) = self.take_failure(MockOp::Follow) {
            return Err(error.into());
        }

        Ok(FollowRecord {
            uri: format!("at://{}/app.bsky.graph.follow/{}", session.did, did),
            cid: format!("mock-cid-{}", did),
        })
    }
}
