//! Single-flight credential renewal.
//!
//! At most one renewal is on the wire at any time. The first caller that
//! needs one spawns it and parks a `PendingRefresh` in the session cell;
//! every later caller clones that handle and awaits the same result. The
//! renewal runs on its own task, so a caller that stops waiting never
//! cancels it for the others.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error};

use super::state::SessionCell;
use crate::api::{RenewalError, Renewer};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailed {
    #[error(transparent)]
    Renewal(#[from] RenewalError),

    #[error("Session changed while renewal was in flight")]
    Superseded,

    #[error("Not signed in")]
    NoSession,

    #[error("Renewal task did not complete")]
    Interrupted,
}

/// Generation of the renewed credential, or why there is none.
pub type RefreshResult = Result<u64, RefreshFailed>;

/// Handle to the in-flight renewal. Clones share one result.
#[derive(Clone)]
pub struct PendingRefresh {
    started_at: Instant,
    from_generation: u64,
    result: Shared<BoxFuture<'static, RefreshResult>>,
}

impl PendingRefresh {
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn from_generation(&self) -> u64 {
        self.from_generation
    }
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    cell: Arc<SessionCell>,
    renewer: Arc<dyn Renewer>,
}

impl RefreshCoordinator {
    pub(crate) fn new(cell: Arc<SessionCell>, renewer: Arc<dyn Renewer>) -> Self {
        Self { cell, renewer }
    }

    /// Renew the credential of generation `from_generation`.
    ///
    /// If that credential was already replaced, returns the current
    /// generation without touching the network. Otherwise joins the
    /// in-flight renewal or starts one.
    pub async fn refresh(&self, from_generation: u64) -> RefreshResult {
        let pending = {
            let mut state = self.cell.lock();

            if state.generation != from_generation {
                return match state.session {
                    Some(_) => {
                        debug!(from_generation, current = state.generation, "Credential already renewed");
                        Ok(state.generation)
                    }
                    None => Err(RefreshFailed::NoSession),
                };
            }

            match state.pending.clone() {
                Some(pending) => {
                    debug!(from_generation, "Joining in-flight renewal");
                    pending
                }
                None => {
                    let Some(refresh_token) = state.session.as_ref().map(|s| s.refresh_token.clone())
                    else {
                        return Err(RefreshFailed::NoSession);
                    };
                    let pending = self.start(refresh_token, from_generation);
                    state.pending = Some(pending.clone());
                    pending
                }
            }
        };

        match pending.result.await {
            // Signed in again while the renewal was on the wire: the new
            // credential is as good as a renewed one.
            Err(RefreshFailed::Superseded) => {
                let state = self.cell.lock();
                match state.session {
                    Some(_) => {
                        debug!(from_generation, current = state.generation, "Renewal superseded by a new session");
                        Ok(state.generation)
                    }
                    None => Err(RefreshFailed::Superseded),
                }
            }
            result => result,
        }
    }

    /// Generation of the current session, or `None` when signed out.
    pub(crate) fn session_generation(&self) -> Option<u64> {
        let state = self.cell.lock();
        state.session.as_ref().map(|_| state.generation)
    }

    /// A handle that does not keep the session alive.
    pub(crate) fn downgrade(&self) -> WeakRefreshCoordinator {
        WeakRefreshCoordinator {
            cell: Arc::downgrade(&self.cell),
            renewer: Arc::clone(&self.renewer),
        }
    }

    /// Time since the in-flight renewal started, if there is one.
    pub fn in_flight(&self) -> Option<Duration> {
        self.cell
            .lock()
            .pending
            .as_ref()
            .map(|p| p.started_at().elapsed())
    }

    /// Spawn the renewal task. Called with the cell locked, so the task
    /// cannot settle before the handle is parked.
    fn start(&self, refresh_token: String, from_generation: u64) -> PendingRefresh {
        debug!(from_generation, "Starting renewal");
        let started_at = Instant::now();
        let renewer = Arc::clone(&self.renewer);
        let cell = Arc::clone(&self.cell);

        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(renewer.renew(&refresh_token))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(RenewalError::Transport("renewal panicked".to_string())));
            cell.settle_renewal(from_generation, started_at, outcome)
        });

        // Weak: the parked handle lives inside the cell it would release.
        let cell = Arc::downgrade(&self.cell);
        let result = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    error!(error = %e, "Renewal task failed");
                    if let Some(cell) = cell.upgrade() {
                        cell.abandon_renewal(from_generation);
                    }
                    Err(RefreshFailed::Interrupted)
                })
            })
            .boxed()
            .shared();

        PendingRefresh {
            started_at,
            from_generation,
            result,
        }
    }
}

/// Coordinator handle for background work that must stop once every
/// `SessionController` sharing the session is gone.
pub(crate) struct WeakRefreshCoordinator {
    cell: Weak<SessionCell>,
    renewer: Arc<dyn Renewer>,
}

impl WeakRefreshCoordinator {
    pub fn upgrade(&self) -> Option<RefreshCoordinator> {
        let cell = self.cell.upgrade()?;
        Some(RefreshCoordinator::new(cell, Arc::clone(&self.renewer)))
    }
}
