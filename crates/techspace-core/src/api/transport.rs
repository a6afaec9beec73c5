use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ApiError;

/// A remote operation: method, path relative to the API base URL, query and body.
#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Operation {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Unserializable request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and body of a completed HTTP exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Network boundary for outbound calls.
///
/// Implementations only move bytes: no retries, no refresh, no status
/// interpretation beyond reporting it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        operation: &Operation,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_builder() {
        let op = Operation::get("/threads")
            .query("planet", "earth")
            .query("limit", "20");
        assert_eq!(op.method, Method::GET);
        assert_eq!(op.path, "/threads");
        assert_eq!(op.query.len(), 2);
        assert!(op.body.is_none());

        let op = Operation::post("/profiles")
            .json(&serde_json::json!({"display_name": "A"}))
            .unwrap();
        assert_eq!(op.body, Some(serde_json::json!({"display_name": "A"})));
    }

    #[test]
    fn test_raw_response_json() {
        let resp = RawResponse::new(200, r#"{"status": "ok"}"#);
        assert!(resp.is_success());
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["status"], "ok");

        let resp = RawResponse::new(204, "");
        assert!(resp.is_success());
        assert!(matches!(
            resp.json::<serde_json::Value>(),
            Err(ApiError::InvalidResponse(_))
        ));
        assert!(!RawResponse::new(401, "").is_success());
    }
}
