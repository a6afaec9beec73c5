//! Session lifecycle management.
//!
//! - `SessionController`: the facade application code calls through
//! - `RefreshCoordinator`: single-flight credential renewal
//! - `OutboundCall`: per-call retry state machine
//! - `SessionEvent`: notifications for sign-in, renewal, termination, logout

pub mod call;
pub mod controller;
pub mod coordinator;
pub mod events;
mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use call::{AuthExpiredAction, CallPhase, OutboundCall};
pub use controller::{SessionController, DEFAULT_REFRESH_AHEAD};
pub use coordinator::{PendingRefresh, RefreshCoordinator, RefreshFailed, RefreshResult};
pub use events::SessionEvent;
