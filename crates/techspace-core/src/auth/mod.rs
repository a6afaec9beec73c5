//! Session data model and persistence.
//!
//! This module provides:
//! - `Session`: user identity plus the access/refresh credential pair
//! - `SessionStore`: narrow load/save/clear repository over the persisted record
//!
//! Three store backends are available: a JSON file in the cache directory,
//! the OS keychain via keyring, and an in-memory store for tests and
//! ephemeral use.

pub mod session;
pub mod store;

pub use session::{CredentialPair, IssuedCredentials, Session, UserIdentity};
pub use store::{FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore};
