use async_trait::async_trait;
use thiserror::Error;

use crate::auth::CredentialPair;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    /// The backend no longer accepts the refresh credential.
    #[error("Refresh credential rejected: {0}")]
    Rejected(String),

    /// The renewal call did not complete.
    #[error("Renewal request failed: {0}")]
    Transport(String),
}

/// The renewal endpoint: trades a refresh credential for a new credential pair.
///
/// Implementations make exactly one attempt per call.
#[async_trait]
pub trait Renewer: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError>;
}
