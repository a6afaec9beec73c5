//! In-process fakes for the two network seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::{ApiError, Operation, RawResponse, RenewalError, Renewer, Transport};
use crate::auth::{CredentialPair, MemorySessionStore, Session, SessionStore};

enum Reply {
    Status(u16, String),
    Fail,
}

struct Rule {
    path: String,
    bearer: Option<String>,
    reply: Reply,
}

/// Backend stand-in: accepts exactly one access token, answers 401 to any
/// other (or to none), and records every request it sees.
pub(crate) struct ScriptedTransport {
    accepted: String,
    rules: Mutex<Vec<Rule>>,
    seen: Mutex<Vec<(String, Option<String>)>>,
    expired: AtomicUsize,
}

impl ScriptedTransport {
    pub fn accepting(token: &str) -> Self {
        Self {
            accepted: token.to_string(),
            rules: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
            expired: AtomicUsize::new(0),
        }
    }

    pub fn respond_to(&self, path: &str, status: u16, body: &str) {
        self.push_rule(path, None, Reply::Status(status, body.to_string()));
    }

    pub fn fail_path(&self, path: &str) {
        self.push_rule(path, None, Reply::Fail);
    }

    /// Fail `path` at the transport level, but only for requests carrying `bearer`.
    pub fn fail_path_for(&self, path: &str, bearer: &str) {
        self.push_rule(path, Some(bearer.to_string()), Reply::Fail);
    }

    fn push_rule(&self, path: &str, bearer: Option<String>, reply: Reply) {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                path: path.to_string(),
                bearer,
                reply,
            });
    }

    pub fn dispatches(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, bearer)| bearer.clone())
            .collect()
    }

    pub fn expired(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    pub async fn wait_for_expired(&self, n: usize) {
        for _ in 0..1000 {
            if self.expired() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("only {} of {} calls saw an expired credential", self.expired(), n);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        operation: &Operation,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((operation.path.clone(), bearer.map(str::to_string)));
        tokio::task::yield_now().await;

        {
            let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
            let rule = rules.iter().find(|r| {
                r.path == operation.path
                    && r.bearer.as_deref().map_or(true, |b| Some(b) == bearer)
            });
            match rule.map(|r| &r.reply) {
                Some(Reply::Status(status, body)) => return Ok(RawResponse::new(*status, body.clone())),
                Some(Reply::Fail) => return Err(ApiError::Transport("connection reset".to_string())),
                None => {}
            }
        }

        if bearer == Some(self.accepted.as_str()) {
            Ok(RawResponse::new(
                200,
                serde_json::json!({ "path": operation.path }).to_string(),
            ))
        } else {
            if bearer.is_some() {
                self.expired.fetch_add(1, Ordering::SeqCst);
            }
            Ok(RawResponse::new(
                401,
                r#"{"detail": {"code": 401, "message": "Invalid token"}}"#,
            ))
        }
    }
}

/// Renewal endpoint stand-in. Counts calls; can hold renewals until released.
pub(crate) struct ScriptedRenewer {
    outcome: Result<CredentialPair, RenewalError>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    refresh_tokens: Mutex<Vec<String>>,
}

impl ScriptedRenewer {
    pub fn issuing(access: &str, refresh: &str) -> Self {
        Self::issuing_for(access, refresh, 3600)
    }

    /// Issue a pair whose access credential lives `expires_in` seconds.
    pub fn issuing_for(access: &str, refresh: &str, expires_in: i64) -> Self {
        Self::with_outcome(Ok(CredentialPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_in: Some(expires_in),
        }))
    }

    pub fn rejecting() -> Self {
        Self::with_outcome(Err(RenewalError::Rejected("Invalid refresh token".to_string())))
    }

    /// The renewal request never reaches the backend.
    pub fn failing_transport() -> Self {
        Self::with_outcome(Err(RenewalError::Transport("connection refused".to_string())))
    }

    fn with_outcome(outcome: Result<CredentialPair, RenewalError>) -> Self {
        Self {
            outcome,
            gate: None,
            calls: AtomicUsize::new(0),
            refresh_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Hold every renewal until `release` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens(&self) -> Vec<String> {
        self.refresh_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("renewer saw {} of {} calls", self.calls(), n);
    }
}

#[async_trait]
impl Renewer for ScriptedRenewer {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(refresh_token.to_string());
        if let Some(ref gate) = self.gate {
            // Dropping the permit hands it back, so one release opens the gate for good.
            let _permit = gate.acquire().await;
        }
        self.outcome.clone()
    }
}

/// Memory store whose writes can be made to fail.
pub(crate) struct FlakyStore {
    inner: MemorySessionStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySessionStore::new(),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl SessionStore for FlakyStore {
    fn load(&self) -> Option<Session> {
        self.inner.load()
    }

    fn save(&self, session: &Session) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.save(session)
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear()
    }
}
