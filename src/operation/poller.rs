use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use super::status::{OperationPhase, OperationStatus};
use super::OperationResult;
use crate::error::{ApiError, TransportError};
use crate::gateway::Gateway;

/// Fixed wait between two fetches of the same resource.
pub const POLL_CADENCE: Duration = Duration::from_secs(1);

/// Marker the gateway puts in `status` while another request holds the resource.
pub const LOCKED_RESOURCE: &str = "locked resource";

/// Drains operation handles and waits on resource conditions.
///
/// The poller knows nothing about sessions; it never aborts or deletes
/// anything on failure. Cleanup belongs to the caller's error path.
pub struct Poller<'a, G: Gateway + ?Sized> {
    gateway: &'a G,
    cadence: Duration,
}

impl<'a, G: Gateway + ?Sized> Poller<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            cadence: POLL_CADENCE,
        }
    }

    /// Fetch `url` until it reports a terminal state, for at most `timeout`
    /// attempts. Only protocol and transport failures are errors here; a
    /// remote `Error` or an exhausted budget are returned as results.
    pub async fn settle(&self, url: &str, timeout: u32) -> Result<OperationResult, ApiError> {
        async move {
            for attempt in 1..=timeout {
                let response = self.gateway.get(url).await?;
                let status = OperationStatus::parse(&response.body).ok_or_else(|| {
                    ApiError::protocol(url, "no status and no state in operation response")
                })?;

                match status.phase {
                    OperationPhase::Successful => {
                        info!(attempt, "operation successful");
                        return Ok(OperationResult::Successful);
                    }
                    OperationPhase::Error => {
                        warn!(
                            attempt,
                            field = status.field.as_str(),
                            message = status.message.as_deref().unwrap_or(""),
                            "operation reported an error"
                        );
                        return Ok(OperationResult::Error(status.message));
                    }
                    OperationPhase::Pending(current) => {
                        debug!(attempt, timeout, status = %current, "operation pending");
                        if attempt < timeout {
                            tokio::time::sleep(self.cadence).await;
                        }
                    }
                }
            }
            warn!(timeout, "operation did not reach a terminal state");
            Ok(OperationResult::TimedOut)
        }
        .instrument(info_span!("operation", %url))
        .await
    }

    /// Like [`Poller::settle`], but any outcome other than `Successful` is an error.
    pub async fn drain(&self, url: &str, timeout: u32) -> Result<(), ApiError> {
        self.settle(url, timeout).await?.into_result(url, timeout)
    }

    /// Fetch `url` until `ready` holds, for at most `timeout` attempts.
    ///
    /// `ready` returns `None` when the field it inspects is absent, which is a
    /// protocol error. A response for which `locked` holds is a retry signal:
    /// it consumes one attempt and is never treated as a failure. The gateway
    /// reports locks with an error status code, so a non-2xx answer whose body
    /// is `locked` is retried; any other non-2xx answer is a transport error.
    /// Returns the body that satisfied `ready`.
    pub async fn wait_for_condition<R, L>(
        &self,
        url: &str,
        ready: R,
        locked: L,
        timeout: u32,
    ) -> Result<Value, ApiError>
    where
        R: Fn(&Value) -> Option<bool> + Send + Sync,
        L: Fn(&Value) -> bool + Send + Sync,
    {
        async move {
            for attempt in 1..=timeout {
                let body = match self.gateway.get(url).await {
                    Ok(response) => response.body,
                    Err(TransportError::Status { status, ref body, .. }) if locked(body) => {
                        debug!(attempt, status, "non-2xx answer on a locked resource");
                        body.clone()
                    }
                    Err(e) => return Err(e.into()),
                };

                if locked(&body) {
                    info!(attempt, timeout, "request made on a locked resource, retrying");
                } else {
                    match ready(&body) {
                        Some(true) => {
                            info!(attempt, "condition met");
                            return Ok(body);
                        }
                        Some(false) => debug!(attempt, timeout, "condition not met yet"),
                        None => {
                            return Err(ApiError::protocol(
                                url,
                                format!("condition field missing from response: {}", body),
                            ))
                        }
                    }
                }

                if attempt < timeout {
                    tokio::time::sleep(self.cadence).await;
                }
            }
            Err(ApiError::OperationTimeout {
                url: url.to_string(),
                attempts: timeout,
            })
        }
        .instrument(info_span!("wait", %url))
        .await
    }
}

/// Read a boolean flag; `null` counts as `false`, a missing field as `None`.
pub fn flag(body: &Value, field: &str) -> Option<bool> {
    match body.get(field)? {
        Value::Bool(b) => Some(*b),
        _ => Some(false),
    }
}

/// True when `status` carries the gateway's locked-resource marker.
pub fn is_locked_resource(body: &Value) -> bool {
    body.get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.contains(LOCKED_RESOURCE))
}

pub fn never_locked(_: &Value) -> bool {
    false
}
