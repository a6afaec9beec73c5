//! TechSpace core library.
//!
//! Client-side session management for the TechSpace API:
//! - `auth`: session data model and durable session storage
//! - `api`: transport, response classification, renewal and issuance endpoints
//! - `session`: single-flight credential renewal and the `SessionController` facade
//! - `config`: on-disk configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;

pub use api::{ApiClient, ApiError, Operation, RawResponse};
pub use auth::{CredentialPair, IssuedCredentials, Session, SessionStore, UserIdentity};
pub use config::{Config, StoreBackend};
pub use error::CallError;
pub use session::{SessionController, SessionEvent};
