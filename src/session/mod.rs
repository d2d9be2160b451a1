//! Session façade over the IxLoad gateway.
//!
//! A [`RestSession`] owns a [`Gateway`] plus the identifiers discovered while
//! talking to it. Mutating calls post to the gateway, take the operation
//! handle from the `Location` header, and drain it with the
//! [`Poller`](crate::operation::Poller) before returning.
//!
//! Cleanup on failure (abort the active test, delete the session) is left to
//! the caller; nothing in here deletes a session on its own.

pub mod chassis;
pub mod paths;
mod run;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, info_span, Instrument};

use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::operation::{flag, never_locked, Poller};

pub use chassis::{Chassis, PortPlan};
pub use paths::{CrfImport, Platform};
pub use run::{supports_delete_result_dir, TestLogEntry};

/// Attempts allowed for a new session to become active.
pub const SESSION_START_TIMEOUT: u32 = 90;
/// Attempts allowed for a chassis to report `isConnected`.
pub const CHASSIS_CONNECT_TIMEOUT: u32 = 60;
/// Attempts allowed for the `runTest` operation.
pub const RUN_TRAFFIC_TIMEOUT: u32 = 300;
/// Attempts allowed for the active test to return to `Unconfigured`.
pub const UNCONFIGURE_TIMEOUT: u32 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseModel {
    #[default]
    #[serde(rename = "Subscription Mode")]
    Subscription,
    #[serde(rename = "Perpetual Mode")]
    Perpetual,
}

impl LicenseModel {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseModel::Subscription => "Subscription Mode",
            LicenseModel::Perpetual => "Perpetual Mode",
        }
    }
}

/// Timeline fields to change on a named timeline. Unset fields are left
/// untouched on the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSettings {
    pub name: String,
    pub sustain_time: Option<u64>,
    pub ramp_up_time: Option<u64>,
    pub ramp_down_time: Option<u64>,
    pub ramp_up_interval: Option<u64>,
    pub standby_time: Option<u64>,
}

impl TimelineSettings {
    /// PATCH body in the gateway's camelCase vocabulary.
    pub fn patch_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(self.name.clone()));
        let fields = [
            ("sustainTime", self.sustain_time),
            ("rampUpTime", self.ramp_up_time),
            ("rampDownTime", self.ramp_down_time),
            ("rampUpInterval", self.ramp_up_interval),
            ("standbyTime", self.standby_time),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                body.insert(key.to_string(), Value::from(v));
            }
        }
        Value::Object(body)
    }
}

/// One entry of the gateway's session list.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub is_active: bool,
    pub active_time: Option<String>,
    /// Absolute URL of the session.
    pub url: Option<String>,
}

/// List every session the gateway knows about.
pub async fn list_sessions<G: Gateway + ?Sized>(gateway: &G) -> Result<Vec<SessionSummary>, ApiError> {
    let url = sessions_url(gateway);
    let response = gateway.get(&url).await?;
    let entries = response
        .body
        .as_array()
        .ok_or_else(|| ApiError::protocol(&url, "session list is not an array"))?;

    entries
        .iter()
        .map(|entry| {
            let session_id = entry
                .get("sessionId")
                .and_then(id_text)
                .ok_or_else(|| ApiError::protocol(&url, "session entry without sessionId"))?;
            Ok(SessionSummary {
                session_id,
                is_active: entry.get("isActive").and_then(Value::as_bool).unwrap_or(false),
                active_time: entry.get("activeTime").and_then(id_text),
                url: first_link(entry).map(|href| gateway.resolve(href)),
            })
        })
        .collect()
}

/// A connected gateway session.
pub struct RestSession<G: Gateway> {
    gateway: G,
    session_id: String,
    session_url: String,
    version: Option<String>,
    platform: Platform,
}

impl<G: Gateway> RestSession<G> {
    /// Create a new session for `version`, start it and wait until the
    /// gateway reports it active.
    ///
    /// A failed start leaves the created session behind; callers that must
    /// clean up use [`RestSession::create`] and [`RestSession::start`].
    pub async fn connect(gateway: G, version: &str, platform: Platform) -> Result<Self, ApiError> {
        let session = Self::create(gateway, version, platform).await?;
        session.start().await?;
        Ok(session)
    }

    /// Create a new session for `version` without starting it.
    pub async fn create(gateway: G, version: &str, platform: Platform) -> Result<Self, ApiError> {
        let url = sessions_url(&gateway);
        async move {
            gateway.post(&url, json!({ "ixLoadVersion": version })).await?;

            let listing = gateway.get(&url).await?;
            let session_id = listing
                .body
                .as_array()
                .and_then(|sessions| sessions.last())
                .and_then(|last| last.get("sessionId"))
                .and_then(id_text)
                .ok_or_else(|| ApiError::protocol(&url, "no sessionId created"))?;
            let session_url = format!("{}/{}", url, session_id);
            info!(%session_id, "session created");

            Ok(Self {
                gateway,
                session_id,
                session_url,
                version: Some(version.to_string()),
                platform,
            })
        }
        .instrument(info_span!("create_session", %version))
        .await
    }

    /// Start a created session and wait until the gateway reports it active.
    pub async fn start(&self) -> Result<(), ApiError> {
        async {
            self.gateway
                .post(&self.url("operations/start"), json!({}))
                .await?;
            Poller::new(&self.gateway)
                .wait_for_condition(
                    &self.session_url,
                    |body| flag(body, "isActive"),
                    never_locked,
                    SESSION_START_TIMEOUT,
                )
                .await?;
            info!("session active");
            Ok(())
        }
        .instrument(info_span!("start_session", session_id = %self.session_id))
        .await
    }

    /// Reuse an existing session without starting anything.
    pub fn attach(gateway: G, session_id: impl Into<String>, platform: Platform) -> Self {
        let session_id = session_id.into();
        let session_url = format!("{}/{}", sessions_url(&gateway), session_id);
        Self {
            gateway,
            session_id,
            session_url,
            version: None,
            platform,
        }
    }

    /// Record the IxLoad version of an attached session, for calls whose
    /// availability depends on it.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_url(&self) -> &str {
        &self.session_url
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.session_url, path)
    }

    /// POST `body`, then drain the returned operation handle.
    async fn post_and_drain(&self, url: &str, body: Value, timeout: u32) -> Result<(), ApiError> {
        let response = self.gateway.post(url, body).await?;
        let operation = self.gateway.resolve(response.operation_handle(url)?);
        Poller::new(&self.gateway).drain(&operation, timeout).await
    }

    pub async fn configure_license(&self, server: &str, model: LicenseModel) -> Result<(), ApiError> {
        info!(%server, model = model.as_str(), "configuring license server");
        self.gateway
            .patch(
                &self.url("ixLoad/preferences"),
                json!({ "licenseServer": server, "licenseModel": model.as_str() }),
            )
            .await?;
        Ok(())
    }

    pub async fn maximum_instances(&self) -> Result<u32, ApiError> {
        let url = self.url("ixLoad/preferences");
        let response = self.gateway.get(&url).await?;
        let value = response
            .body
            .get("maximumInstances")
            .and_then(id_text)
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| ApiError::protocol(&url, "no numeric maximumInstances"))?;
        Ok(value)
    }

    /// Number of active sessions on the gateway, this one included.
    pub async fn open_sessions(&self) -> Result<usize, ApiError> {
        let sessions = list_sessions(&self.gateway).await?;
        Ok(sessions.iter().filter(|s| s.is_active).count())
    }

    /// Upload a local file to `remote_path` on the gateway host.
    pub async fn upload_file(&self, local: &Path, remote_path: &str, overwrite: bool) -> Result<(), ApiError> {
        let bytes = tokio::fs::read(local).await.map_err(|source| ApiError::Io {
            path: local.display().to_string(),
            source,
        })?;
        info!(
            local = %local.display(),
            remote = %remote_path,
            size = bytes.len(),
            "uploading file"
        );
        let url = format!("{}/api/v0/resources", self.gateway.base_url());
        let query = [
            ("overwrite", overwrite.to_string()),
            ("uploadPath", remote_path.to_string()),
        ];
        self.gateway.upload(&url, &query, bytes).await?;
        Ok(())
    }

    pub async fn delete_logs_on_session_close(&self) -> Result<(), ApiError> {
        self.gateway
            .patch(&self.session_url, json!({ "deleteLogsOnSessionClose": true }))
            .await?;
        Ok(())
    }

    pub async fn delete_session(&self) -> Result<(), ApiError> {
        info!(session_id = %self.session_id, "deleting session");
        self.gateway.delete(&self.session_url).await?;
        Ok(())
    }
}

fn sessions_url<G: Gateway + ?Sized>(gateway: &G) -> String {
    format!("{}/api/v0/sessions", gateway.base_url())
}

/// Identifiers arrive as numbers or strings depending on the gateway build.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_link(entry: &Value) -> Option<&str> {
    entry.get("links")?.get(0)?.get("href")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::gateway::scripted::{ScriptedGateway, BASE};
    use tokio_test::assert_ok;

    const SESSIONS: &str = "http://gw:8080/api/v0/sessions";
    const S4: &str = "http://gw:8080/api/v0/sessions/4";

    #[tokio::test(start_paused = true)]
    async fn test_connect_takes_last_session_and_waits_active() {
        let gw = ScriptedGateway::new();
        gw.on_post(SESSIONS, None, json!({}))
            .on_get(SESSIONS, json!([{"sessionId": 3}, {"sessionId": 4}]))
            .on_post(&format!("{}/operations/start", S4), None, json!({}))
            .on_get_seq(
                S4,
                [
                    json!({"isActive": false}),
                    json!({"isActive": null}),
                    json!({"isActive": true}),
                ],
            );

        let session = RestSession::connect(gw, "9.10.115.43", Platform::Windows)
            .await
            .unwrap();

        assert_eq!(session.session_id(), "4");
        assert_eq!(session.session_url(), S4);
        assert_eq!(session.version(), Some("9.10.115.43"));
        assert_eq!(session.gateway().count("GET", S4), 3);
        assert_eq!(
            session.gateway().bodies("POST", SESSIONS),
            vec![json!({"ixLoadVersion": "9.10.115.43"})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_session_id_is_protocol_error() {
        let gw = ScriptedGateway::new();
        gw.on_post(SESSIONS, None, json!({})).on_get(SESSIONS, json!([]));

        let err = RestSession::connect(gw, "9.10.115.43", Platform::Windows)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_when_never_active() {
        let gw = ScriptedGateway::new();
        gw.on_post(SESSIONS, None, json!({}))
            .on_get(SESSIONS, json!([{"sessionId": "4"}]))
            .on_post(&format!("{}/operations/start", S4), None, json!({}))
            .on_get(S4, json!({"isActive": false}));

        let err = RestSession::connect(gw, "9.10.115.43", Platform::Windows)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ApiError::OperationTimeout { attempts: SESSION_START_TIMEOUT, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_keeps_session_for_cleanup() {
        let gw = ScriptedGateway::new();
        gw.on_post(SESSIONS, None, json!({}))
            .on_get(SESSIONS, json!([{"sessionId": "4"}]))
            .on_post(&format!("{}/operations/start", S4), None, json!({}))
            .on_get_status(S4, 500, json!("Internal Server Error"))
            .on_delete(S4);

        let session = RestSession::create(gw, "9.10.115.43", Platform::Windows)
            .await
            .unwrap();
        assert_eq!(session.gateway().count("POST", &format!("{}/operations/start", S4)), 0);

        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport(TransportError::Status { status: 500, .. })
        ));
        assert_eq!(session.gateway().count("GET", S4), 1);

        assert_ok!(session.delete_session().await);
        assert_eq!(session.gateway().count("DELETE", S4), 1);
    }

    #[test]
    fn test_attach_builds_session_url() {
        let session = RestSession::attach(ScriptedGateway::new(), "12", Platform::Linux);
        assert_eq!(session.session_url(), format!("{}/api/v0/sessions/12", BASE));
        assert_eq!(session.version(), None);
        assert_eq!(session.with_version("8.50.115.333").version(), Some("8.50.115.333"));
    }

    #[tokio::test]
    async fn test_license_patch_body() {
        let gw = ScriptedGateway::new();
        gw.on_patch(&format!("{}/ixLoad/preferences", S4));
        let session = RestSession::attach(gw, "4", Platform::Windows);

        assert_ok!(session.configure_license("192.168.70.3", LicenseModel::Perpetual).await);
        assert_eq!(
            session.gateway().bodies("PATCH", &format!("{}/ixLoad/preferences", S4)),
            vec![json!({"licenseServer": "192.168.70.3", "licenseModel": "Perpetual Mode"})]
        );
    }

    #[tokio::test]
    async fn test_maximum_instances_accepts_string_or_number() {
        let gw = ScriptedGateway::new();
        gw.on_get_seq(
            &format!("{}/ixLoad/preferences", S4),
            [json!({"maximumInstances": "4"}), json!({"maximumInstances": 6})],
        );
        let session = RestSession::attach(gw, "4", Platform::Windows);
        assert_eq!(session.maximum_instances().await.unwrap(), 4);
        assert_eq!(session.maximum_instances().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_list_sessions_and_open_count() {
        let gw = ScriptedGateway::new();
        gw.on_get(
            SESSIONS,
            json!([
                {"sessionId": 1, "isActive": false, "activeTime": 0,
                 "links": [{"href": "/api/v0/sessions/1"}]},
                {"sessionId": 2, "isActive": true, "activeTime": 1712,
                 "links": [{"href": "/api/v0/sessions/2"}]},
                {"sessionId": "4", "isActive": true}
            ]),
        );

        let sessions = list_sessions(&gw).await.unwrap();
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[1].session_id, "2");
        assert_eq!(sessions[1].active_time.as_deref(), Some("1712"));
        assert_eq!(sessions[1].url.as_deref(), Some("http://gw:8080/api/v0/sessions/2"));
        assert_eq!(sessions[2].url, None);

        let session = RestSession::attach(gw, "4", Platform::Windows);
        assert_eq!(session.open_sessions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upload_file_sends_bytes_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("http.rxf");
        std::fs::write(&local, b"rxf-bytes").unwrap();

        let gw = ScriptedGateway::new();
        gw.on_upload("http://gw:8080/api/v0/resources");
        let session = RestSession::attach(gw, "4", Platform::Linux);
        session
            .upload_file(&local, "/mnt/ixload-share/http.rxf", true)
            .await
            .unwrap();

        assert_eq!(
            session.gateway().bodies("UPLOAD", "http://gw:8080/api/v0/resources"),
            vec![json!({"overwrite": "true", "uploadPath": "/mnt/ixload-share/http.rxf", "size": 9})]
        );
    }

    #[tokio::test]
    async fn test_upload_missing_local_file_is_io_error() {
        let session = RestSession::attach(ScriptedGateway::new(), "4", Platform::Linux);
        let err = session
            .upload_file(Path::new("/definitely/not/here.rxf"), "/mnt/x.rxf", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Io { .. }));
        assert!(session.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_session_and_logs_flag() {
        let gw = ScriptedGateway::new();
        gw.on_patch(S4).on_delete(S4);
        let session = RestSession::attach(gw, "4", Platform::Windows);

        session.delete_logs_on_session_close().await.unwrap();
        session.delete_session().await.unwrap();

        assert_eq!(
            session.gateway().bodies("PATCH", S4),
            vec![json!({"deleteLogsOnSessionClose": true})]
        );
        assert_eq!(session.gateway().count("DELETE", S4), 1);
    }

    #[test]
    fn test_timeline_patch_body_skips_unset() {
        let timeline = TimelineSettings {
            name: "Timeline1".to_string(),
            sustain_time: Some(12),
            ramp_down_time: Some(5),
            ..TimelineSettings::default()
        };
        assert_eq!(
            timeline.patch_body(),
            json!({"name": "Timeline1", "sustainTime": 12, "rampDownTime": 5})
        );
    }

    #[test]
    fn test_license_model_serde_names() {
        #[derive(Deserialize)]
        struct Wrap {
            model: LicenseModel,
        }
        let w: Wrap = toml::from_str("model = \"Subscription Mode\"").unwrap();
        assert_eq!(w.model, LicenseModel::Subscription);
        assert_eq!(LicenseModel::default(), LicenseModel::Subscription);
    }
}
