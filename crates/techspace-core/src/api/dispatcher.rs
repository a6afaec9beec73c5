use std::sync::Arc;

use tracing::debug;

use super::transport::{RawResponse, Transport};
use super::ApiError;
use crate::session::OutboundCall;

/// Classified outcome of a single dispatch.
#[derive(Debug)]
pub enum Dispatch {
    /// 2xx response.
    Success(RawResponse),
    /// 401 on a call that carried an access credential.
    AuthExpired,
    /// Anything else, including transport failures.
    OtherError(ApiError),
}

/// Issues outbound calls and classifies their responses.
///
/// Never retries and never refreshes; that policy belongs to `SessionController`.
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `call`, attaching `credential` only when the call asks for it.
    pub async fn send(&self, call: &OutboundCall, credential: Option<&str>) -> Dispatch {
        let operation = call.operation();
        let bearer = if call.attach_credential() {
            credential
        } else {
            None
        };

        let response = match self.transport.execute(operation, bearer).await {
            Ok(response) => response,
            Err(e) => {
                debug!(method = %operation.method, path = %operation.path, error = %e, "Dispatch failed");
                return Dispatch::OtherError(e);
            }
        };

        debug!(
            method = %operation.method,
            path = %operation.path,
            status = response.status,
            retry = call.retry_count(),
            "Dispatched"
        );

        Self::classify(response, bearer.is_some())
    }

    fn classify(response: RawResponse, credential_attached: bool) -> Dispatch {
        if response.is_success() {
            Dispatch::Success(response)
        } else if response.status == 401 && credential_attached {
            Dispatch::AuthExpired
        } else {
            Dispatch::OtherError(ApiError::from_status(response.status, &response.body))
        }
    }
}
