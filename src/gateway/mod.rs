//! The HTTP verbs the rest of the crate talks through.
//!
//! [`Gateway`] is the seam between the polling core and the network: the
//! poller and the stat collector only ever call these methods, so tests drive
//! them with scripted responses and production uses [`http::HttpGateway`].

pub mod http;

use serde_json::Value;

use crate::error::{ApiError, TransportError};

pub use http::HttpGateway;

/// A successful (2xx) answer from the gateway.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// `Location` header; set by calls that start an asynchronous operation.
    pub location: Option<String>,
    /// Decoded JSON body. Empty bodies decode to `Null`, non-JSON text to a string.
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            location: None,
            body,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// The operation handle of an asynchronous call.
    pub fn operation_handle(&self, request_url: &str) -> Result<&str, ApiError> {
        self.location
            .as_deref()
            .ok_or_else(|| ApiError::protocol(request_url, "response has no Location header"))
    }
}

/// Minimal verb surface of the IxLoad gateway.
#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    /// Scheme, host and port, e.g. `https://10.0.0.3:8443`.
    fn base_url(&self) -> &str;

    async fn get(&self, url: &str) -> Result<ApiResponse, TransportError>;

    async fn post(&self, url: &str, body: Value) -> Result<ApiResponse, TransportError>;

    async fn patch(&self, url: &str, body: Value) -> Result<ApiResponse, TransportError>;

    async fn delete(&self, url: &str) -> Result<ApiResponse, TransportError>;

    /// Raw file upload with query parameters.
    async fn upload(
        &self,
        url: &str,
        query: &[(&str, String)],
        bytes: Vec<u8>,
    ) -> Result<ApiResponse, TransportError>;

    /// Turn a server-relative path (as found in `Location` headers and
    /// `links[].href`) into an absolute URL. Absolute URLs pass through.
    fn resolve(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{}", self.base_url(), location)
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted;

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedGateway;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let gw = ScriptedGateway::new();
        assert_eq!(
            gw.resolve("/api/v0/sessions/4/ixLoad/test/operations/runTest/0"),
            "http://gw:8080/api/v0/sessions/4/ixLoad/test/operations/runTest/0"
        );
        assert_eq!(gw.resolve("https://other:8443/x"), "https://other:8443/x");
    }

    #[test]
    fn test_operation_handle_requires_location() {
        let resp = ApiResponse::new(202, json!({}));
        assert!(matches!(
            resp.operation_handle("http://gw/op"),
            Err(ApiError::Protocol { .. })
        ));

        let resp = resp.with_location("/api/v0/op/1");
        assert_eq!(resp.operation_handle("http://gw/op").unwrap(), "/api/v0/op/1");
    }
}
