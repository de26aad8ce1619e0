//! Configuration parameters for the dashboard server.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `DASHBOARD__*` environment variables (a `.env` file is honored too).

use crate::apps::{default_apps, QuickAccessApp};
use crate::{DEFAULT_CONFIG_FILE, DEFAULT_HOST, DEFAULT_PORT, ENV_PREFIX};
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use typed_builder::TypedBuilder;

/// Period between two snapshot pushes on a streaming connection.
pub const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 5;

/// Window between the two CPU tick-counter readings.
pub const DEFAULT_CPU_SAMPLE_WINDOW_MS: u64 = 1000;

/// Upper bound on a single host command (`df`, `sensors`, ...).
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Error)]
pub enum DashboardConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, Setters, TypedBuilder,
)]
#[serde(default)]
#[getset(get = "pub", set = "pub")]
pub struct DashboardConfig {
    #[builder(default = DEFAULT_HOST.to_string(), setter(into))]
    host: String,
    #[builder(default = DEFAULT_PORT)]
    port: u16,
    /// How many successive ports to try when the configured one is taken.
    #[builder(default = 5)]
    max_port_retries: u16,
    #[builder(default = 500)]
    port_retry_interval_ms: u64,
    #[builder(default = DEFAULT_PUBLISH_INTERVAL_SECS)]
    publish_interval_secs: u64,
    #[builder(default = DEFAULT_CPU_SAMPLE_WINDOW_MS)]
    cpu_sample_window_ms: u64,
    #[builder(default = DEFAULT_COMMAND_TIMEOUT_MS)]
    command_timeout_ms: u64,
    /// Value of `Access-Control-Allow-Origin` on API responses.
    #[builder(default = "*".to_string(), setter(into))]
    allowed_origin: String,
    /// Interface name prefixes considered for throughput, first match wins.
    #[builder(default = vec!["eth0".into(), "ens".into(), "enp".into(), "wlan".into()])]
    interface_prefixes: Vec<String>,
    #[builder(default = default_apps())]
    apps: Vec<QuickAccessApp>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig::builder().build()
    }
}

impl DashboardConfig {
    /// Loads `.env`, then the configuration file (the given path, which must
    /// exist, or [`DEFAULT_CONFIG_FILE`] if present) and the environment.
    pub fn load(file_path: Option<&str>) -> Result<Self, DashboardConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = ?path, "Loaded .env file");
        }
        Self::load_with_prefix(file_path, ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(
        file_path: Option<&str>,
        env_prefix: &str,
    ) -> Result<Self, DashboardConfigError> {
        let file = match file_path {
            Some(path) => File::new(path, FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let config = ConfigBuilder::<DefaultState>::default()
            .set_default("host", DEFAULT_HOST)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .add_source(file)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<DashboardConfig>()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DashboardConfigError> {
        if self.publish_interval_secs == 0 {
            return Err(DashboardConfigError::Invalid(
                "publish_interval_secs must be greater than zero".into(),
            ));
        }
        if self.cpu_sample_window_ms == 0 {
            return Err(DashboardConfigError::Invalid(
                "cpu_sample_window_ms must be greater than zero".into(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(DashboardConfigError::Invalid(
                "command_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.interface_prefixes.iter().all(|prefix| prefix.is_empty()) {
            return Err(DashboardConfigError::Invalid(
                "interface_prefixes must name at least one interface".into(),
            ));
        }
        for app in &self.apps {
            app.parsed_url().map_err(|e| {
                DashboardConfigError::Invalid(format!(
                    "app {} has an invalid url {:?}: {}",
                    app.name(),
                    app.url(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_window_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn port_retry_interval(&self) -> Duration {
        Duration::from_millis(self.port_retry_interval_ms)
    }
}
