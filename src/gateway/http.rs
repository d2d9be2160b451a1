use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::{debug, trace};

use super::{ApiResponse, Gateway};
use crate::config::GatewayConfig;
use crate::error::TransportError;

/// [`Gateway`] backed by `reqwest`.
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| TransportError::InvalidApiKey)?;
            headers.insert("X-Api-Key", value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(TransportError::Client)?;

        let base_url = config.base_url();
        debug!(%base_url, "gateway client ready");
        Ok(Self { client, base_url })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, TransportError> {
        debug!(%method, %url, "gateway request");
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = &body {
            trace!(%body, "request body");
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Request {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;
        read_response(method.as_str(), url, response).await
    }
}

async fn read_response(
    method: &str,
    url: &str,
    response: Response,
) -> Result<ApiResponse, TransportError> {
    let status = response.status();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response
        .text()
        .await
        .map_err(|source| TransportError::Request {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;
    let body = decode_body(text);

    debug!(status = status.as_u16(), ?location, "gateway response");
    trace!(%body, "response body");

    if !status.is_success() {
        return Err(TransportError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(ApiResponse {
        status: status.as_u16(),
        location,
        body,
    })
}

/// Gateway error pages are not always JSON; keep them readable instead of failing.
fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait::async_trait]
impl Gateway for HttpGateway {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: &str) -> Result<ApiResponse, TransportError> {
        self.send(Method::GET, url, None).await
    }

    async fn post(&self, url: &str, body: Value) -> Result<ApiResponse, TransportError> {
        self.send(Method::POST, url, Some(body)).await
    }

    async fn patch(&self, url: &str, body: Value) -> Result<ApiResponse, TransportError> {
        self.send(Method::PATCH, url, Some(body)).await
    }

    async fn delete(&self, url: &str) -> Result<ApiResponse, TransportError> {
        self.send(Method::DELETE, url, None).await
    }

    async fn upload(
        &self,
        url: &str,
        query: &[(&str, String)],
        bytes: Vec<u8>,
    ) -> Result<ApiResponse, TransportError> {
        debug!(%url, size = bytes.len(), "gateway upload");
        // The resources endpoint takes the raw file under this content type.
        let response = self
            .client
            .post(url)
            .query(query)
            .header(CONTENT_TYPE, "multipart/form-data")
            .body(bytes)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                method: "POST".to_string(),
                url: url.to_string(),
                source,
            })?;
        read_response("POST", url, response).await
    }
}
