// src/config.rs

//! Manages server configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Upper bound for every timer period in seconds (one day).
pub const MAX_TIMER_SECS: u64 = 86_400;
/// Upper bound for `send_timeout_ms` (one hour).
pub const MAX_SEND_TIMEOUT_MS: u64 = 3_600_000;

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    8878
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_cloud_data_path")]
    cloud_data_path: String,
    #[serde(default)]
    ip_filter: bool,
    #[serde(default = "default_ip_filter_path")]
    ip_filter_path: String,
    #[serde(default)]
    name_filter: bool,
    #[serde(default = "default_name_filter_path")]
    name_filter_path: String,
    #[serde(rename = "HTTP_response", alias = "http_response", default = "default_true")]
    http_response: bool,
    #[serde(default = "default_public_dir")]
    public_dir: String,
    #[serde(default)]
    banner: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_to_file: bool,
    #[serde(default = "default_log_file_path")]
    log_file_path: String,
    #[serde(default = "default_max_log_lines")]
    max_log_lines: usize,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_send_queue_capacity")]
    send_queue_capacity: usize,
    #[serde(default = "default_send_timeout_ms")]
    send_timeout_ms: u64,
    #[serde(default = "default_ping_interval_secs")]
    ping_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    idle_timeout_secs: u64,
    #[serde(default = "default_persist_retry_secs")]
    persist_retry_secs: u64,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_cloud_data_path() -> String {
    "data/cloud_data.json".to_string()
}
fn default_ip_filter_path() -> String {
    "config/ip_filter.json".to_string()
}
fn default_name_filter_path() -> String {
    "config/name_filter.json".to_string()
}
fn default_true() -> bool {
    true
}
fn default_public_dir() -> String {
    "public".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file_path() -> String {
    "logs/server.log".to_string()
}
fn default_max_log_lines() -> usize {
    1000
}
fn default_max_clients() -> usize {
    10000
}
fn default_send_queue_capacity() -> usize {
    256
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    90
}
fn default_persist_retry_secs() -> u64 {
    5
}

/// Represents the final, validated server configuration. It is built once at
/// startup and shared read-only for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// The JSON file holding the persisted variable table.
    pub cloud_data_path: String,
    /// Enables the IP deny-list at `ip_filter_path`.
    pub ip_filter: bool,
    pub ip_filter_path: String,
    /// Enables the identity deny-list at `name_filter_path`.
    pub name_filter: bool,
    pub name_filter_path: String,
    /// Enables the static HTTP surface (UI page, assets, `/data`).
    #[serde(rename = "HTTP_response")]
    pub http_response: bool,
    pub public_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file_path: String,
    pub max_log_lines: usize,
    pub max_clients: usize,
    /// Capacity of each session's outbound queue.
    pub send_queue_capacity: usize,
    pub send_timeout_ms: u64,
    /// Heartbeat period. `0` disables pings.
    pub ping_interval_secs: u64,
    /// Peers silent for longer than this are disconnected. `0` disables the check.
    pub idle_timeout_secs: u64,
    /// How often a table left unpersisted by a failed write is retried. `0` disables retries.
    pub persist_retry_secs: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cloud_data_path: default_cloud_data_path(),
            ip_filter: false,
            ip_filter_path: default_ip_filter_path(),
            name_filter: false,
            name_filter_path: default_name_filter_path(),
            http_response: true,
            public_dir: default_public_dir(),
            banner: None,
            log_level: default_log_level(),
            log_to_file: false,
            log_file_path: default_log_file_path(),
            max_log_lines: default_max_log_lines(),
            max_clients: default_max_clients(),
            send_queue_capacity: default_send_queue_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            ping_interval_secs: default_ping_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            persist_retry_secs: default_persist_retry_secs(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Loads `path` if it exists, otherwise falls back to the defaults.
    /// Used for the implicit default config location only.
    pub fn from_file_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            cloud_data_path: raw_config.cloud_data_path,
            ip_filter: raw_config.ip_filter,
            ip_filter_path: raw_config.ip_filter_path,
            name_filter: raw_config.name_filter,
            name_filter_path: raw_config.name_filter_path,
            http_response: raw_config.http_response,
            public_dir: raw_config.public_dir,
            banner: raw_config.banner.filter(|b| !b.trim().is_empty()),
            log_level: raw_config.log_level,
            log_to_file: raw_config.log_to_file,
            log_file_path: raw_config.log_file_path,
            max_log_lines: raw_config.max_log_lines,
            max_clients: raw_config.max_clients,
            send_queue_capacity: raw_config.send_queue_capacity,
            send_timeout_ms: raw_config.send_timeout_ms,
            ping_interval_secs: raw_config.ping_interval_secs,
            idle_timeout_secs: raw_config.idle_timeout_secs,
            persist_retry_secs: raw_config.persist_retry_secs,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.cloud_data_path.trim().is_empty() {
            return Err(anyhow!("cloud_data_path cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.max_clients > Semaphore::MAX_PERMITS {
            return Err(anyhow!(
                "max_clients cannot exceed {}",
                Semaphore::MAX_PERMITS
            ));
        }
        if self.send_queue_capacity == 0 {
            return Err(anyhow!("send_queue_capacity cannot be 0"));
        }
        if self.send_timeout_ms == 0 {
            return Err(anyhow!("send_timeout_ms cannot be 0"));
        }
        if self.send_timeout_ms > MAX_SEND_TIMEOUT_MS {
            return Err(anyhow!(
                "send_timeout_ms cannot exceed {MAX_SEND_TIMEOUT_MS}"
            ));
        }
        for (key, secs) in [
            ("ping_interval_secs", self.ping_interval_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("persist_retry_secs", self.persist_retry_secs),
        ] {
            if secs > MAX_TIMER_SECS {
                return Err(anyhow!("{key} cannot exceed {MAX_TIMER_SECS}"));
            }
        }
        if self.ip_filter && self.ip_filter_path.trim().is_empty() {
            return Err(anyhow!(
                "ip_filter_path cannot be empty when ip_filter is enabled"
            ));
        }
        if self.name_filter && self.name_filter_path.trim().is_empty() {
            return Err(anyhow!(
                "name_filter_path cannot be empty when name_filter is enabled"
            ));
        }
        if self.log_to_file {
            if self.log_file_path.trim().is_empty() {
                return Err(anyhow!(
                    "log_file_path cannot be empty when log_to_file is enabled"
                ));
            }
            if self.max_log_lines == 0 {
                return Err(anyhow!(
                    "max_log_lines cannot be 0 when log_to_file is enabled"
                ));
            }
        }
        if self.idle_timeout_secs > 0
            && self.ping_interval_secs > 0
            && self.idle_timeout_secs <= self.ping_interval_secs
        {
            warn!(
                "idle_timeout_secs ({}) is not greater than ping_interval_secs ({}). Healthy peers may be disconnected.",
                self.idle_timeout_secs, self.ping_interval_secs
            );
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn persist_retry_interval(&self) -> Option<Duration> {
        (self.persist_retry_secs > 0).then(|| Duration::from_secs(self.persist_retry_secs))
    }
}
