//! Wire types for the credential endpoints.

use serde::{Deserialize, Serialize};

use crate::auth::{CredentialPair, UserIdentity};

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub display_name: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct TokenBundle {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl From<TokenBundle> for CredentialPair {
    fn from(bundle: TokenBundle) -> Self {
        CredentialPair {
            access_token: bundle.id_token,
            refresh_token: bundle.refresh_token,
            expires_in: bundle.expires_in,
        }
    }
}

/// Body of register, login and refresh responses. Only register carries `user`.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub user: Option<UserIdentity>,
    pub tokens: TokenBundle,
}
