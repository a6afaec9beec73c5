//! Public facade over the session: authenticated calls with one bounded
//! renewal-and-redispatch cycle, sign-in, logout and session events.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::call::{AuthExpiredAction, OutboundCall};
use super::coordinator::{RefreshCoordinator, RefreshFailed};
use super::events::SessionEvent;
use super::state::{Credential, SessionCell};
use crate::api::{ApiClient, Dispatch, Operation, RawResponse, RequestDispatcher, Renewer, Transport};
use crate::auth::{
    FileSessionStore, IssuedCredentials, KeyringSessionStore, Session, SessionStore, UserIdentity,
};
use crate::config::{Config, StoreBackend};
use crate::error::CallError;

/// Path of the profile endpoint used to hydrate the user identity.
const ME_PATH: &str = "/auth/me";

/// Default proactive renewal window before access-credential expiry.
pub const DEFAULT_REFRESH_AHEAD: Duration = Duration::from_secs(300);

/// Clone is cheap; clones share one session.
#[derive(Clone)]
pub struct SessionController {
    cell: Arc<SessionCell>,
    coordinator: RefreshCoordinator,
    dispatcher: RequestDispatcher,
    refresh_ahead: chrono::Duration,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
        renewer: Arc<dyn Renewer>,
    ) -> Self {
        let cell = Arc::new(SessionCell::load(store));
        Self {
            coordinator: RefreshCoordinator::new(Arc::clone(&cell), renewer),
            dispatcher: RequestDispatcher::new(transport),
            cell,
            refresh_ahead: to_chrono(DEFAULT_REFRESH_AHEAD),
        }
    }

    /// Build a controller talking to the configured backend through one shared client.
    pub fn from_config(config: &Config) -> anyhow::Result<(Self, ApiClient)> {
        let client = ApiClient::with_timeout(config.api_base_url.clone(), config.request_timeout())?;
        let store: Arc<dyn SessionStore> = match config.store {
            StoreBackend::File => Arc::new(FileSessionStore::new(Config::cache_dir()?)),
            StoreBackend::Keyring => Arc::new(KeyringSessionStore::new()),
        };
        let controller = Self::new(store, Arc::new(client.clone()), Arc::new(client.clone()))
            .with_refresh_ahead(config.refresh_ahead());
        Ok((controller, client))
    }

    /// Renew before dispatch when the access credential expires within `ahead`.
    /// Zero disables proactive renewal.
    pub fn with_refresh_ahead(mut self, ahead: Duration) -> Self {
        self.refresh_ahead = to_chrono(ahead);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.cell.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.cell.snapshot().map(|(session, _)| session)
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.session().and_then(|s| s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.cell.lock().session.is_some()
    }

    /// Time since the in-flight renewal started, if one is running.
    pub fn renewal_in_flight(&self) -> Option<Duration> {
        self.coordinator.in_flight()
    }

    /// Enter Authenticated with credentials from login or registration.
    pub fn sign_in(&self, issued: IssuedCredentials) -> anyhow::Result<()> {
        self.cell.sign_in(issued)
    }

    /// Clear the session locally. No network call; safe to repeat.
    pub fn logout(&self) -> anyhow::Result<()> {
        self.cell.sign_out().map(|_| ())
    }

    /// Perform `operation` with the current access credential attached.
    pub async fn call(&self, operation: Operation) -> Result<RawResponse, CallError> {
        self.execute(OutboundCall::new(operation, true)).await
    }

    /// Perform `operation` without credentials. Never triggers renewal.
    pub async fn call_anonymous(&self, operation: Operation) -> Result<RawResponse, CallError> {
        self.execute(OutboundCall::new(operation, false)).await
    }

    pub async fn call_json<T: DeserializeOwned>(&self, operation: Operation) -> Result<T, CallError> {
        let response = self.call(operation).await?;
        Ok(response.json()?)
    }

    /// Renew now, joining a renewal already in flight.
    pub async fn refresh_now(&self) -> Result<(), CallError> {
        let generation = match self.cell.snapshot() {
            Some((_, generation)) => generation,
            None => return Err(CallError::Unauthenticated),
        };
        self.renew(generation).await.map(|_| ())
    }

    /// Fetch the profile of the signed-in user and store it in the session.
    pub async fn hydrate_user(&self) -> Result<UserIdentity, CallError> {
        let user: UserIdentity = self.call_json(Operation::get(ME_PATH)).await?;
        let stored = user.clone();
        match self.cell.update_user(move |slot| *slot = Some(stored)) {
            Ok(true) => debug!(uid = %user.uid, "User identity hydrated"),
            Ok(false) => return Err(CallError::Unauthenticated),
            Err(e) => warn!(error = %e, "Failed to persist user identity"),
        }
        Ok(user)
    }

    /// Edit the stored identity in place, e.g. after a profile update.
    /// Returns false when signed out or no identity is known.
    pub fn update_user(&self, f: impl FnOnce(&mut UserIdentity)) -> anyhow::Result<bool> {
        let mut changed = false;
        let updated = self.cell.update_user(|slot| {
            if let Some(user) = slot.as_mut() {
                f(user);
                changed = true;
            }
        })?;
        Ok(updated && changed)
    }

    /// Renew on a fixed interval until the session ends or every controller
    /// sharing it has been dropped.
    pub fn spawn_periodic_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let coordinator = self.coordinator.downgrade();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    debug!("Periodic refresh stopping: controller dropped");
                    break;
                };
                let Some(generation) = coordinator.session_generation() else {
                    debug!("Periodic refresh stopping: signed out");
                    break;
                };
                if let Err(e) = coordinator.refresh(generation).await {
                    info!(error = %e, "Periodic refresh stopping");
                    break;
                }
            }
        })
    }

    async fn execute(&self, mut call: OutboundCall) -> Result<RawResponse, CallError> {
        let mut credential = if call.attach_credential() {
            Some(self.prepare_credential().await?)
        } else {
            None
        };

        loop {
            debug_assert!(call.can_dispatch());
            let token = credential.as_ref().map(|c| c.access_token.as_str());
            let dispatch = self.dispatcher.send(&call, token).await;
            match dispatch {
                Dispatch::Success(response) => return Ok(response),
                Dispatch::OtherError(e) => return Err(e.into()),
                Dispatch::AuthExpired => {
                    let Some(stale) = credential.take() else {
                        return Err(CallError::Unauthenticated);
                    };
                    match call.on_auth_expired() {
                        AuthExpiredAction::GiveUp => {
                            warn!(
                                path = %call.operation().path,
                                "Credential rejected again after renewal"
                            );
                            return Err(CallError::Unauthenticated);
                        }
                        AuthExpiredAction::Renew => {
                            debug!(path = %call.operation().path, generation = stale.generation, "Access credential expired");
                            self.renew(stale.generation).await?;
                            credential = Some(self.current_credential()?);
                        }
                    }
                }
            }
        }
    }

    /// Credential for a first dispatch. Anonymous sessions fail without a
    /// network round trip; a missing or expiring access credential is
    /// renewed first without spending the call's retry.
    async fn prepare_credential(&self) -> Result<Credential, CallError> {
        let (session, generation) = self.cell.snapshot().ok_or(CallError::Unauthenticated)?;
        if session.needs_refresh(self.refresh_ahead) {
            debug!(generation, "Renewing before dispatch");
            self.renew(generation).await?;
        }
        self.current_credential()
    }

    fn current_credential(&self) -> Result<Credential, CallError> {
        self.cell
            .current_credential()
            .ok_or(CallError::Unauthenticated)
    }

    async fn renew(&self, generation: u64) -> Result<u64, CallError> {
        self.coordinator.refresh(generation).await.map_err(|e| {
            match e {
                RefreshFailed::Superseded | RefreshFailed::NoSession => {
                    debug!(error = %e, "Renewal not applicable")
                }
                _ => warn!(error = %e, "Renewal failed"),
            }
            CallError::Unauthenticated
        })
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
