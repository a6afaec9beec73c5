use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identity of the signed-in user, as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl UserIdentity {
    /// Name for display: display name, then username, then uid.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.username.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.uid)
    }
}

/// A freshly issued or renewed access/refresh credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access credential lifetime in seconds, when the issuer reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Output of the external credential-issuance collaborator (login/register).
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub user: Option<UserIdentity>,
    pub credentials: CredentialPair,
}

/// The persisted session record.
///
/// A session with a refresh credential but no access credential is valid:
/// it is waiting for a renewal before it can be used.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user: Option<UserIdentity>,
    #[serde(default)]
    pub access_token: Option<String>,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: Option<UserIdentity>, credentials: CredentialPair) -> Self {
        Self {
            user,
            access_token: Some(credentials.access_token),
            refresh_token: credentials.refresh_token,
            expires_in: credentials.expires_in,
            issued_at: Utc::now(),
        }
    }

    /// Replace the credential pair with a renewed one, keeping the identity.
    pub fn apply_renewal(&mut self, credentials: CredentialPair) {
        self.access_token = Some(credentials.access_token);
        self.refresh_token = credentials.refresh_token;
        self.expires_in = credentials.expires_in;
        self.issued_at = Utc::now();
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Expiry of the access credential, if its lifetime is known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| self.issued_at + Duration::seconds(secs))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().map(|at| Utc::now() >= at).unwrap_or(false)
    }

    /// Check if the access credential is missing or will expire within `ahead`.
    ///
    /// The window never exceeds half the credential's lifetime, so a freshly
    /// issued short-lived credential is used before it is renewed.
    pub fn needs_refresh(&self, ahead: Duration) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        let (Some(lifetime), Some(at)) = (self.expires_in, self.expires_at()) else {
            return false;
        };
        let window = ahead.min(Duration::seconds(lifetime.max(0) / 2));
        if window <= Duration::zero() {
            return false;
        }
        Utc::now()
            .checked_add_signed(window)
            .map_or(true, |deadline| deadline >= at)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at()
            .map(|at| (at - Utc::now()).num_minutes().max(0))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("has_access_token", &self.access_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
