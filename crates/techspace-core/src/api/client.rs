//! HTTP client for the TechSpace REST API.
//!
//! `ApiClient` is the reqwest-backed implementation of both network seams
//! (`Transport` for ordinary calls, `Renewer` for the refresh endpoint) and
//! also speaks the credential-issuance endpoints (register/login).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::renewal::{RenewalError, Renewer};
use super::transport::{Operation, RawResponse, Transport};
use super::types::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse};
use super::ApiError;
use crate::auth::{CredentialPair, IssuedCredentials};

// ============================================================================
// Constants
// ============================================================================

/// Default base URL of the TechSpace backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const REGISTER_PATH: &str = "/auth/register";
const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh";

/// API client for TechSpace.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status.as_u16(), &body))
        }
    }

    async fn post_for_tokens<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<TokenResponse, ApiError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse token response: {}", e)))
    }

    /// Create an account; the backend signs the new user in immediately.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        username: &str,
    ) -> Result<IssuedCredentials, ApiError> {
        let request = RegisterRequest {
            email,
            password,
            display_name,
            username,
        };
        let resp = self.post_for_tokens(REGISTER_PATH, &request).await?;
        debug!(has_user = resp.user.is_some(), "Registered");
        Ok(IssuedCredentials {
            user: resp.user,
            credentials: resp.tokens.into(),
        })
    }

    /// Exchange e-mail and password for a credential pair. Login returns no profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedCredentials, ApiError> {
        let request = LoginRequest { email, password };
        let resp = self.post_for_tokens(LOGIN_PATH, &request).await?;
        debug!("Logged in");
        Ok(IssuedCredentials {
            user: resp.user,
            credentials: resp.tokens.into(),
        })
    }

    /// Map a failed refresh response onto the renewal taxonomy.
    fn renewal_error(status: u16, body: &str) -> RenewalError {
        let message = ApiError::message_from_body(body);
        match status {
            400 | 401 | 403 => RenewalError::Rejected(message),
            _ => RenewalError::Transport(format!("Status {}: {}", status, message)),
        }
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn execute(
        &self,
        operation: &Operation,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        let mut request = self
            .client
            .request(operation.method.clone(), self.url(&operation.path));
        if !operation.query.is_empty() {
            request = request.query(&operation.query);
        }
        if let Some(ref body) = operation.body {
            request = request.json(body);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            ApiError::Transport(format!("{} {}: {}", operation.method, operation.path, e))
        })?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl Renewer for ApiClient {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RenewalError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RenewalError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            let err = Self::renewal_error(status, &body);
            warn!(status, error = %err, "Renewal refused");
            return Err(err);
        }

        let resp: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| RenewalError::Transport(format!("Failed to parse refresh response: {}", e)))?;
        Ok(resp.tokens.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/auth/me"), "http://localhost:8000/auth/me");
        assert_eq!(client.url("threads"), "http://localhost:8000/threads");
    }

    #[test]
    fn test_renewal_error_mapping() {
        assert_eq!(
            ApiClient::renewal_error(401, r#"{"detail": {"code": 401, "message": "Invalid refresh token"}}"#),
            RenewalError::Rejected("Invalid refresh token".to_string())
        );
        assert!(matches!(
            ApiClient::renewal_error(400, r#"{"error": "INVALID_REFRESH_TOKEN"}"#),
            RenewalError::Rejected(_)
        ));
        assert!(matches!(
            ApiClient::renewal_error(502, "Bad Gateway"),
            RenewalError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Nothing listens on port 1
        let client = ApiClient::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        match client.execute(&Operation::get("/threads"), None).await {
            Err(ApiError::Transport(msg)) => assert!(msg.starts_with("GET /threads")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
