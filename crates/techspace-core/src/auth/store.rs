use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::Session;

/// Session file name in cache directory
pub const SESSION_FILE: &str = "session.json";

/// Keychain service name used by `KeyringSessionStore`
pub const KEYRING_SERVICE: &str = "techspace";

/// Keychain account holding the serialized session
const KEYRING_ACCOUNT: &str = "session";

/// Durable storage of the current session record.
///
/// The store is a pass-through for opaque bytes: it never validates
/// credentials. A record that cannot be decoded loads as absent.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<Session>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

fn encode(session: &Session) -> Result<String> {
    serde_json::to_string_pretty(session).context("Failed to serialize session")
}

fn decode(contents: &str, source: &str) -> Option<Session> {
    match serde_json::from_str(contents) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(source, error = %e, "Malformed session record, treating as signed out");
            None
        }
    }
}

/// Session stored as JSON in a file, by default `<cache_dir>/techspace/session.json`.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<Session> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read session file");
                return None;
            }
        };
        decode(&contents, "file")
    }

    fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = encode(session)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        debug!(path = ?self.path, "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "Session file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }
}

/// Session stored as a single secret in the OS keychain.
pub struct KeyringSessionStore {
    service: String,
}

impl KeyringSessionStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, KEYRING_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for KeyringSessionStore {
    fn load(&self) -> Option<Session> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(contents) => decode(&contents, "keyring"),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to retrieve session from keychain");
                None
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let contents = encode(session)?;
        self.entry()?
            .set_password(&contents)
            .context("Failed to store session in keychain")?;

        // A fresh entry must see the record, or the platform store is not durable.
        let stored = self
            .entry()?
            .get_password()
            .context("Keychain did not retain the session")?;
        if stored != contents {
            anyhow::bail!("Keychain returned a different session record than was saved");
        }
        debug!(service = %self.service, "Session saved to keychain");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

/// In-process store. Keeps the serialized record so load/save behave
/// exactly like the durable backends.
#[derive(Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw record, bypassing serialization.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(raw.into())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<Session> {
        let record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        record.as_deref().and_then(|raw| decode(raw, "memory"))
    }

    fn save(&self, session: &Session) -> Result<()> {
        let contents = encode(session)?;
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(contents);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
