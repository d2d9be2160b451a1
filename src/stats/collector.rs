use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use super::sink::StatSink;
use super::snapshot::{GroupReading, StatSnapshot};
use super::{ExitStatus, StatGroup, TestRunState};
use crate::error::{ApiError, TransportError};
use crate::gateway::Gateway;
use crate::operation::POLL_CADENCE;

/// Wait between collection cycles while the test is running.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive one-second observations outside `Running`/`Unconfigured`
/// tolerated before the loop gives up.
pub const STALL_GRACE: u32 = 30;

/// Polls the active test and its stat groups for one session.
pub struct StatCollector<'a, G: Gateway + ?Sized> {
    gateway: &'a G,
    active_test_url: String,
    stats_url: String,
    interval: Duration,
    grace: u32,
}

impl<'a, G: Gateway + ?Sized> StatCollector<'a, G> {
    /// `session_url` is the absolute URL of the session, e.g.
    /// `http://gw:8080/api/v0/sessions/4`.
    pub fn new(gateway: &'a G, session_url: &str) -> Self {
        Self {
            gateway,
            active_test_url: format!("{}/ixLoad/test/activeTest", session_url),
            stats_url: format!("{}/ixLoad/stats", session_url),
            interval: DEFAULT_POLL_INTERVAL,
            grace: STALL_GRACE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_grace(mut self, grace: u32) -> Self {
        self.grace = grace;
        self
    }

    /// Current lifecycle state. A non-2xx answer yields `None` so the caller
    /// can treat it like any other transient state.
    pub async fn observe_state(&self) -> Result<Option<TestRunState>, ApiError> {
        let body = match self.gateway.get(&self.active_test_url).await {
            Ok(response) => response.body,
            Err(TransportError::Status { status, .. }) => {
                warn!(status, "active test state unavailable");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let token = body
            .get("currentState")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::protocol(&self.active_test_url, "no currentState in active test"))?;
        Ok(Some(TestRunState::parse(token)))
    }

    /// Read the newest bucket of one group. `None` when the gateway has not
    /// produced any snapshot for it yet.
    pub async fn collect_group(&self, group: &StatGroup) -> Result<Option<GroupReading>, ApiError> {
        let url = format!("{}/{}/values", self.stats_url, group.name);
        let response = self.gateway.get(&url).await?;
        let snapshot = StatSnapshot::parse(&group.name, &url, &response.body)?;

        let Some((timestamp, bucket)) = snapshot.latest() else {
            debug!(group = %group.name, "no snapshot yet");
            return Ok(None);
        };

        let reading = GroupReading::extract(group, timestamp, bucket);
        for (name, value) in &reading.values {
            info!(group = %group.name, timestamp, stat = %name, %value, "stat");
        }
        for name in &reading.missing {
            warn!(
                group = %group.name,
                stat = %name,
                "stat name not found, check spelling and case sensitivity"
            );
        }
        Ok(Some(reading))
    }

    /// Run until the test is `Unconfigured` or has stalled past the grace
    /// period. With a sink, every group reading with at least one value is
    /// appended as a row.
    pub async fn poll_loop(
        &self,
        groups: &[StatGroup],
        mut sink: Option<&mut dyn StatSink>,
    ) -> Result<ExitStatus, ApiError> {
        let span = info_span!("stats", groups = groups.len(), interval = ?self.interval);
        async move {
            let mut stalled = 0u32;
            let mut cycles = 0u32;

            loop {
                match self.observe_state().await? {
                    Some(TestRunState::Running) => {
                        stalled = 0;
                        if groups.is_empty() {
                            tokio::time::sleep(POLL_CADENCE).await;
                            continue;
                        }

                        for group in groups {
                            let Some(reading) = self.collect_group(group).await? else {
                                continue;
                            };
                            if let Some(sink) = sink.as_deref_mut() {
                                if !reading.values.is_empty() {
                                    sink.append(&reading.group, &reading.row())?;
                                }
                            }
                        }
                        cycles += 1;
                        tokio::time::sleep(self.interval).await;
                    }
                    Some(TestRunState::Unconfigured) => {
                        info!(cycles, "active test unconfigured, stat polling done");
                        return Ok(ExitStatus::Completed { cycles });
                    }
                    other => {
                        let state = other.map_or_else(|| "unknown".to_string(), |s| s.to_string());
                        stalled += 1;
                        if stalled > self.grace {
                            warn!(%state, grace = self.grace, "active test stalled, leaving stat polling");
                            return Ok(ExitStatus::Stalled {
                                last_state: state,
                                cycles,
                            });
                        }
                        info!(%state, stalled, grace = self.grace, "waiting for running state");
                        tokio::time::sleep(POLL_CADENCE).await;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
