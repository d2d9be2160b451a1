//! Test lifecycle calls: load, configure, apply, run, observe, tear down.

use std::path::Path;
use std::time::Duration;

use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::paths::{crf_import_paths, timestamp_folder, CrfImport};
use super::{id_text, RestSession, TimelineSettings, RUN_TRAFFIC_TIMEOUT, UNCONFIGURE_TIMEOUT};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::operation::{never_locked, OperationStatus, Poller, DEFAULT_TIMEOUT};
use crate::stats::{ExitStatus, StatCollector, StatGroup, StatSink, TestRunState};

/// Version that shipped `deleteTestResultDirectory` ahead of 9.x.
const DELETE_RESULT_DIR_BACKPORT: &str = "8.50.115.333";

/// One line of the active test's event log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestLogEntry {
    #[serde(rename = "objectID")]
    pub object_id: u64,
    #[serde(default)]
    pub time_stamp: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub module_name: String,
    #[serde(default)]
    pub message: String,
}

impl<G: Gateway> RestSession<G> {
    /// Load a saved `.rxf` configuration that already exists on the gateway host.
    pub async fn load_config_file(&self, rxf: &str) -> Result<(), ApiError> {
        info!(%rxf, "loading configuration");
        self.post_and_drain(
            &self.url("ixLoad/test/operations/loadTest"),
            json!({ "fullPath": rxf }),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Import a `.crf` archive into a fresh timestamp folder next to `crf`,
    /// uploading it first when `local` is given.
    pub async fn import_crf_file(&self, crf: &str, local: Option<&Path>) -> Result<CrfImport, ApiError> {
        let import = crf_import_paths(self.platform, crf, &timestamp_folder(Local::now()));
        if let Some(local) = local {
            self.upload_file(local, &import.src_file, true).await?;
        }
        info!(src = %import.src_file, dest = %import.dest_rxf, "importing configuration archive");
        self.post_and_drain(
            &self.url("ixLoad/test/operations/importConfig"),
            json!({ "srcFile": import.src_file, "destRxf": import.dest_rxf }),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(import)
    }

    /// Point the run's results at `dir` on the gateway host, optionally in a
    /// new timestamp folder. Returns the directory actually configured.
    pub async fn set_result_dir(&self, dir: &str, timestamp: bool) -> Result<String, ApiError> {
        let path = if timestamp {
            self.platform.join(dir, &timestamp_folder(Local::now()))
        } else {
            dir.to_string()
        };
        self.gateway
            .patch(
                &self.url("ixLoad/test"),
                json!({ "outputDir": true, "runResultDirFull": path }),
            )
            .await?;
        info!(%path, "result directory set");
        Ok(path)
    }

    pub async fn result_path(&self) -> Result<String, ApiError> {
        let url = self.url("ixLoad/test");
        let response = self.gateway.get(&url).await?;
        response
            .body
            .get("runResultDirFull")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::protocol(&url, "no runResultDirFull"))
    }

    /// Delete the run's result directory on the gateway host.
    ///
    /// Only IxLoad 9.x and `8.50.115.333` have this call; on other versions
    /// an error is logged and `false` returned.
    pub async fn delete_result_dir(&self) -> Result<bool, ApiError> {
        let version = self.version.as_deref().unwrap_or("unknown");
        if !supports_delete_result_dir(version) {
            error!(%version, "this IxLoad version does not support deleteTestResultDirectory");
            return Ok(false);
        }
        let url = self
            .url("ixLoad/test/operations/deleteTestResultDirectory")
            .replacen("/api/v0/", "/api/v1/", 1);
        self.post_and_drain(&url, json!({}), DEFAULT_TIMEOUT).await?;
        Ok(true)
    }

    pub async fn enable_force_ownership(&self) -> Result<(), ApiError> {
        self.gateway
            .patch(
                &self.url("ixLoad/test/activeTest"),
                json!({ "enableForceOwnership": true }),
            )
            .await?;
        Ok(())
    }

    pub async fn configure_timeline(&self, timeline: &TimelineSettings) -> Result<(), ApiError> {
        let list_url = self.url("ixLoad/test/activeTest/timelineList");
        let response = self.gateway.get(&list_url).await?;
        let object_id = response
            .body
            .as_array()
            .into_iter()
            .flatten()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some(timeline.name.as_str()))
            .and_then(|entry| entry.get("objectID"))
            .and_then(id_text)
            .ok_or_else(|| ApiError::TimelineNotFound(timeline.name.clone()))?;

        info!(name = %timeline.name, %object_id, "configuring timeline");
        self.gateway
            .patch(&format!("{}/{}", list_url, object_id), timeline.patch_body())
            .await?;
        Ok(())
    }

    /// Names of the stat groups the loaded configuration exposes.
    pub async fn stat_names(&self) -> Result<Vec<String>, ApiError> {
        let url = self.url("ixLoad/stats");
        let response = self.gateway.get(&url).await?;
        let links = response
            .body
            .get("links")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::protocol(&url, "no links in stats resource"))?;

        Ok(links
            .iter()
            .filter_map(|link| link.get("href").and_then(Value::as_str))
            .filter_map(|href| href.trim_end_matches('/').rsplit('/').next())
            .map(str::to_string)
            .collect())
    }

    /// Disable every stat under `configured_stats`, a path relative to the
    /// session such as `ixLoad/stats/HTTPClient/configuredStats`.
    pub async fn disable_all_stats(&self, configured_stats: &str) -> Result<(), ApiError> {
        self.gateway
            .patch(&self.url(configured_stats), json!({ "enabled": false }))
            .await?;
        Ok(())
    }

    /// Re-enable the stats whose caption matches each of `captions`.
    pub async fn enable_stats(&self, configured_stats: &str, captions: &[&str]) -> Result<(), ApiError> {
        let base = self.url(configured_stats);
        for caption in captions {
            let url = format!("{}?filter=\"caption eq {}\"", base, caption);
            info!(%caption, "enabling stat");
            self.gateway.patch(&url, json!({ "enabled": true })).await?;
        }
        Ok(())
    }

    pub async fn apply_configuration(&self) -> Result<(), ApiError> {
        self.post_and_drain(
            &self.url("ixLoad/test/operations/applyconfiguration"),
            json!({}),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    pub async fn save_configuration(&self) -> Result<(), ApiError> {
        self.gateway
            .post(&self.url("ixLoad/test/operations/save"), json!({}))
            .await?;
        Ok(())
    }

    /// Start traffic and wait for the run operation to succeed. Returns the
    /// operation id for [`RestSession::run_test_status`].
    pub async fn run_traffic(&self) -> Result<String, ApiError> {
        let url = self.url("ixLoad/test/operations/runTest");
        let response = self.gateway.post(&url, json!({})).await?;
        let handle = response.operation_handle(&url)?;
        let operation_id = handle.rsplit('/').next().unwrap_or(handle).to_string();
        info!(%operation_id, "traffic started");
        Poller::new(&self.gateway)
            .drain(&self.gateway.resolve(handle), RUN_TRAFFIC_TIMEOUT)
            .await?;
        Ok(operation_id)
    }

    pub async fn run_test_status(&self, operation_id: &str) -> Result<OperationStatus, ApiError> {
        let url = self.url(&format!("ixLoad/test/operations/runTest/{}", operation_id));
        let response = self.gateway.get(&url).await?;
        OperationStatus::parse(&response.body)
            .ok_or_else(|| ApiError::protocol(&url, "no status and no state in run status"))
    }

    pub async fn active_test_state(&self) -> Result<TestRunState, ApiError> {
        let url = self.url("ixLoad/test/activeTest");
        let response = self.gateway.get(&url).await?;
        response
            .body
            .get("currentState")
            .and_then(Value::as_str)
            .map(TestRunState::parse)
            .ok_or_else(|| ApiError::protocol(&url, "no currentState in active test"))
    }

    /// Collect `groups` until the test is unconfigured or stalls.
    pub async fn poll_stats(
        &self,
        groups: &[StatGroup],
        interval: Duration,
        sink: Option<&mut dyn StatSink>,
    ) -> Result<ExitStatus, ApiError> {
        StatCollector::new(&self.gateway, &self.session_url)
            .with_interval(interval)
            .poll_loop(groups, sink)
            .await
    }

    pub async fn wait_for_active_test_unconfigured(&self) -> Result<(), ApiError> {
        let url = self.url("ixLoad/test/activeTest");
        Poller::new(&self.gateway)
            .wait_for_condition(
                &url,
                |body| {
                    body.get("currentState")
                        .and_then(Value::as_str)
                        .map(|state| state == TestRunState::Unconfigured.as_str())
                },
                never_locked,
                UNCONFIGURE_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    /// Stop the active test and release its configuration.
    pub async fn abort_active_test(&self) -> Result<(), ApiError> {
        info!(session_id = %self.session_id, "aborting active test");
        self.post_and_drain(
            &self.url("ixLoad/test/operations/abortAndReleaseConfigWaitFinish"),
            json!({}),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    pub async fn wait_for_all_capture_data(&self) -> Result<(), ApiError> {
        self.post_and_drain(
            &self.url("ixLoad/test/operations/waitForAllCaptureData"),
            json!({}),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    pub async fn test_logs(&self) -> Result<Vec<TestLogEntry>, ApiError> {
        let url = self.url("ixLoad/test/logs");
        let response = self.gateway.get(&url).await?;
        serde_json::from_value(response.body)
            .map_err(|e| ApiError::protocol(&url, format!("malformed test log: {}", e)))
    }
}

/// `deleteTestResultDirectory` exists from 9.0 on, plus one 8.50 build.
pub fn supports_delete_result_dir(version: &str) -> bool {
    if version == DELETE_RESULT_DIR_BACKPORT {
        return true;
    }
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major >= 9)
}
