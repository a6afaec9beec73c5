//! The in-memory authoritative session and the renewal slot.
//!
//! Both live behind one mutex so that "begin renewal", "deliver renewal"
//! and "clear renewal" are a single critical section together with the
//! credential update they imply.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::coordinator::{PendingRefresh, RefreshFailed};
use super::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::api::RenewalError;
use crate::auth::{CredentialPair, IssuedCredentials, Session, SessionStore, UserIdentity};

/// Credential a call is dispatched with, tagged with the generation it belongs to.
#[derive(Clone)]
pub(crate) struct Credential {
    pub access_token: String,
    pub generation: u64,
}

pub(crate) struct CellState {
    pub session: Option<Session>,
    /// Bumped on every credential change (sign-in, renewal, termination, logout).
    pub generation: u64,
    pub pending: Option<PendingRefresh>,
}

pub(crate) struct SessionCell {
    state: Mutex<CellState>,
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionCell {
    /// Build the cell from whatever the store holds.
    pub fn load(store: Arc<dyn SessionStore>) -> Self {
        let session = store.load();
        debug!(has_session = session.is_some(), "Session loaded");
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(CellState {
                session,
                generation: 0,
                pending: None,
            }),
            store,
            events,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine: events are notification-only.
        let _ = self.events.send(event);
    }

    /// Current session and generation, or `None` when anonymous.
    pub fn snapshot(&self) -> Option<(Session, u64)> {
        let state = self.lock();
        state.session.clone().map(|s| (s, state.generation))
    }

    pub fn current_credential(&self) -> Option<Credential> {
        let state = self.lock();
        let access_token = state.session.as_ref()?.access_token.clone()?;
        Some(Credential {
            access_token,
            generation: state.generation,
        })
    }

    pub fn sign_in(&self, issued: IssuedCredentials) -> anyhow::Result<()> {
        let mut state = self.lock();
        let user = issued
            .user
            .or_else(|| state.session.as_ref().and_then(|s| s.user.clone()));
        let session = Session::new(user, issued.credentials);
        self.store.save(&session)?;

        state.session = Some(session);
        state.generation += 1;
        // A renewal started for the previous session must not apply to this one.
        state.pending = None;
        info!(generation = state.generation, "Signed in");
        self.emit(SessionEvent::SignedIn);
        Ok(())
    }

    /// Drop the session. Returns whether one existed.
    pub fn sign_out(&self) -> anyhow::Result<bool> {
        let mut state = self.lock();
        let had_session = state.session.take().is_some();
        state.pending = None;
        if had_session {
            state.generation += 1;
        }
        let cleared = self.store.clear();
        if had_session {
            info!("Signed out");
            self.emit(SessionEvent::SignedOut);
        }
        cleared.map(|_| had_session)
    }

    /// Apply `f` to the stored identity, if there is one.
    pub fn update_user(&self, f: impl FnOnce(&mut Option<UserIdentity>)) -> anyhow::Result<bool> {
        let mut state = self.lock();
        let Some(session) = state.session.as_mut() else {
            return Ok(false);
        };
        f(&mut session.user);
        self.store.save(session)?;
        Ok(true)
    }

    /// Deliver the result of the renewal started at `from_generation`.
    ///
    /// Runs on the renewal task, exactly once per renewal, whether or not
    /// anyone is still waiting for it.
    pub fn settle_renewal(
        &self,
        from_generation: u64,
        started_at: Instant,
        outcome: Result<CredentialPair, RenewalError>,
    ) -> Result<u64, RefreshFailed> {
        let mut state = self.lock();
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        if state
            .pending
            .as_ref()
            .is_some_and(|p| p.from_generation() == from_generation)
        {
            state.pending = None;
        }

        if state.generation != from_generation {
            // Signed out or signed in again while the renewal was on the wire.
            debug!(from_generation, current = state.generation, elapsed_ms, "Discarding superseded renewal");
            return Err(RefreshFailed::Superseded);
        }

        match outcome {
            Ok(credentials) => {
                let Some(session) = state.session.as_mut() else {
                    return Err(RefreshFailed::Superseded);
                };
                session.apply_renewal(credentials);
                if let Err(e) = self.store.save(session) {
                    warn!(error = %e, "Failed to persist renewed session");
                }
                state.generation += 1;
                info!(generation = state.generation, elapsed_ms, "Credentials renewed");
                self.emit(SessionEvent::Renewed);
                Ok(state.generation)
            }
            Err(e) => {
                state.session = None;
                state.generation += 1;
                if let Err(clear_err) = self.store.clear() {
                    error!(error = %clear_err, "Failed to clear session store after failed renewal");
                }
                warn!(error = %e, elapsed_ms, "Renewal failed, session terminated");
                self.emit(SessionEvent::Terminated);
                Err(e.into())
            }
        }
    }

    /// Release the renewal slot when the renewal task could not deliver.
    pub fn abandon_renewal(&self, from_generation: u64) {
        let mut state = self.lock();
        if state
            .pending
            .as_ref()
            .is_some_and(|p| p.from_generation() == from_generation)
        {
            state.pending = None;
        }
    }
}
