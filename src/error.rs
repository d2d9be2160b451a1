//! Error taxonomy for gateway calls, operation polling, and stat collection.

use serde_json::Value;
use thiserror::Error;

use crate::stats::sink::SinkError;

/// Failure of a single HTTP exchange with the gateway.
///
/// Non-2xx answers are not swallowed: they come back as [`TransportError::Status`]
/// carrying the decoded body, so callers that expect a failure (a port that is
/// already assigned, a chassis that is still locked) can inspect it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error("{method} {url} failed: {source}")]
    Request {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: Value,
    },
}

impl TransportError {
    /// Body of a non-2xx answer, if this error carries one.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The `error` text of a non-2xx answer, if the gateway sent one.
    pub fn gateway_message(&self) -> Option<&str> {
        self.body()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
    }
}

/// A chassis/card/port triple that could not be attached to a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub chassis_id: u64,
    pub card_id: u32,
    pub port_id: u32,
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.chassis_id, self.card_id, self.port_id)
    }
}

/// Canonical error type for everything above the transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The gateway answered without a field the client relies on.
    #[error("protocol error at {url}: {detail}")]
    Protocol { url: String, detail: String },

    /// The remote operation reached its `Error` terminal state.
    #[error(
        "operation {url} failed: {}",
        .message.as_deref().unwrap_or("no message from gateway")
    )]
    OperationFailed { url: String, message: Option<String> },

    /// No terminal state was observed within the attempt budget.
    #[error("operation {url} did not reach a terminal state within {attempts} attempts")]
    OperationTimeout { url: String, attempts: u32 },

    /// A stat query came back with an embedded error token.
    #[error("stat query for {group} failed: {message} (probable cause: misconfigured stat names)")]
    StatQuery { group: String, message: String },

    #[error("community {name} is not part of the port plan (planned: {planned:?})")]
    UnknownCommunity { name: String, planned: Vec<String> },

    #[error("failed to assign ports on chassis {chassis_ip}: {}", format_ports(.failed))]
    PortAssignment { chassis_ip: String, failed: Vec<PortRef> },

    #[error("no timeline named {0}")]
    TimelineNotFound(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn protocol(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.into(),
            detail: detail.into(),
        }
    }
}

fn format_ports(ports: &[PortRef]) -> String {
    ports
        .iter()
        .map(PortRef::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
