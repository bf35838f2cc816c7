//! Configuration types for the pulse service

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::StatsPeriod;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub resync: ResyncConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub status_api: StatusApiConfig,
}

/// REST backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            api_token: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_url")]
    pub url: String,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
            connection_timeout_seconds: default_connection_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic channel reconnection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Enable automatic reconnection when the channel drops
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reconnect_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Maximum number of reconnection attempts (None for unlimited)
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_reconnect_initial_delay(),
            max_delay_ms: default_max_delay(),
            max_retries: None,
        }
    }
}

/// Backoff policy for snapshot refetches after a status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncConfig {
    #[serde(default = "default_resync_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Fraction of each delay randomized in either direction
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_resync_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Chart series settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Number of chart points kept in memory
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

/// Which monitor the CLI watches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub monitor_id: Option<String>,
    #[serde(default)]
    pub period: StatsPeriod,
}

/// Read-only JSON status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

impl Default for StatusApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_status_port(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_channel_url() -> String {
    "ws://localhost:3000/events".to_string()
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_reconnect_initial_delay() -> u64 {
    1000
}

fn default_resync_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

fn default_max_attempts() -> u32 {
    8
}

fn default_retention() -> usize {
    100
}

fn default_status_port() -> u16 {
    11120
}

impl Config {
    /// Reject values the engine cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(crate::PulseError::Config(
                "api.base_url must not be empty".to_string(),
            ));
        }
        if !(self.channel.url.starts_with("ws://") || self.channel.url.starts_with("wss://")) {
            return Err(crate::PulseError::Config(format!(
                "channel.url must be a ws:// or wss:// URL, got '{}'",
                self.channel.url
            )));
        }
        if self.chart.retention == 0 {
            return Err(crate::PulseError::Config(
                "chart.retention must be at least 1".to_string(),
            ));
        }
        if self.resync.max_attempts == 0 {
            return Err(crate::PulseError::Config(
                "resync.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::PulseError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
