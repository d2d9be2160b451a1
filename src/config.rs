//! TOML configuration for the gateway client and for test runs.
//!
//! Two files are involved: a [`ClientConfig`] describing how to reach the
//! gateway (host, port, credentials, logging), and a [`RunProfile`] describing
//! one test run (saved configuration, port plan, stats to watch). Both use
//! `#[serde(default)]` throughout so partial files are valid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::chassis::PortPlan;
use crate::session::paths::Platform;
use crate::session::{LicenseModel, TimelineSettings};
use crate::stats::sink::CsvOptions;
use crate::stats::StatGroup;

/// Environment variable naming the client config file.
pub const CONFIG_ENV: &str = "IXLOAD_REST_CONFIG";

/// Config file looked up in the working directory when nothing else is given.
pub const LOCAL_CONFIG: &str = "ixload-rest.toml";

// ---------------------------------------------------------------------------
// Client config
// ---------------------------------------------------------------------------

/// Root configuration for talking to a gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded client configuration");
        Ok(config)
    }

    /// Resolve configuration from, in order:
    /// 1. `explicit` (a load failure is an error here).
    /// 2. The path in `IXLOAD_REST_CONFIG`.
    /// 3. `./ixload-rest.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "IXLOAD_REST_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

/// How to reach the gateway's REST server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    /// 8080 for http; 8443 switches to https automatically.
    pub port: u16,
    /// Force https on a non-standard port.
    pub https: bool,
    /// Only needed when authentication is enabled on the gateway.
    pub api_key: Option<String>,
    /// Gateways ship with self-signed certificates, so this defaults to off.
    pub verify_ssl: bool,
    /// Per-request timeout, independent of operation polling budgets.
    pub request_timeout_secs: u64,
    /// Operating system of the gateway host; decides path separators.
    pub platform: Platform,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            https: false,
            api_key: None,
            verify_ssl: false,
            request_timeout_secs: 60,
            platform: Platform::Windows,
        }
    }
}

impl GatewayConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.https || self.port == 8443 {
            "https"
        } else {
            "http"
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exact IxLoad version to start a new session with (e.g. `9.10.115.43`).
    pub ixload_version: Option<String>,
    /// Delete the session when the run finishes or fails.
    pub delete_session: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ixload_version: None,
            delete_session: true,
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines on stdout instead of human-readable text.
    pub json: bool,
    /// Additionally append every event to this file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run profile
// ---------------------------------------------------------------------------

/// Everything needed to load, run and observe one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProfile {
    /// Saved `.rxf` configuration path on the gateway host.
    pub config_file: String,
    /// Local file to upload to `config_file` before loading it.
    pub upload_from: Option<PathBuf>,
    /// Results directory on the gateway host.
    pub results_dir: Option<String>,
    /// Append a per-run timestamp folder to `results_dir`.
    pub timestamp_results_dir: bool,
    pub license: Option<LicenseConfig>,
    pub ports: Option<PortPlan>,
    pub force_ownership: bool,
    pub timeline: Option<TimelineSettings>,
    pub stats: StatsConfig,
    /// Remove the run's result directory on the gateway once the test is done.
    pub delete_result_dir: bool,
}

impl Default for RunProfile {
    fn default() -> Self {
        Self {
            config_file: String::new(),
            upload_from: None,
            results_dir: None,
            timestamp_results_dir: true,
            license: None,
            ports: None,
            force_ownership: true,
            timeline: None,
            stats: StatsConfig::default(),
            delete_result_dir: false,
        }
    }
}

impl RunProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run profile: {}", path.display()))?;
        let profile: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse run profile: {}", path.display()))?;
        if profile.config_file.is_empty() {
            anyhow::bail!("run profile {} does not name a config_file", path.display());
        }
        if profile.stats.interval_secs == 0 {
            anyhow::bail!(
                "run profile {}: stats.interval_secs must be at least 1",
                path.display()
            );
        }
        info!(path = %path.display(), config_file = %profile.config_file, "loaded run profile");
        Ok(profile)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    pub server: String,
    #[serde(default)]
    pub model: LicenseModel,
}

/// Stat groups to watch while the test runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub interval_secs: u64,
    pub groups: Vec<StatGroup>,
    /// Record every snapshot into per-group CSV files.
    pub csv: Option<CsvOptions>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            groups: Vec::new(),
            csv: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
