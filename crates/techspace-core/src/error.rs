use thiserror::Error;

use crate::api::ApiError;

/// Terminal failure of a `SessionController::call`.
#[derive(Error, Debug)]
pub enum CallError {
    /// No usable session: signed out, renewal failed, or the credential
    /// was rejected again after one renewal.
    #[error("Not signed in")]
    Unauthenticated,

    /// Failure unrelated to credentials, passed through unchanged.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CallError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, CallError::Unauthenticated)
    }
}
