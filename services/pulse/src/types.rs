//! Monitor, statistics and chart types shared by the loader and the engine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete health of a monitor as of its last check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Up,
    Down,
    #[default]
    Pending,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Pending => write!(f, "pending"),
        }
    }
}

/// A monitor record: configuration plus the live fields kept current by check events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Check interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_expected_status_code")]
    pub expected_status_code: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub last_status: MonitorStatus,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_response_ms: Option<f64>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Monitor {
    /// A monitor with default check settings and no check recorded yet
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            url: url.into(),
            method: default_method(),
            interval: default_interval(),
            expected_status_code: default_expected_status_code(),
            timeout: default_timeout(),
            last_status: MonitorStatus::default(),
            last_checked_at: None,
            last_response_ms: None,
            last_error: None,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_interval() -> u64 {
    60
}

fn default_expected_status_code() -> u16 {
    200
}

fn default_timeout() -> u64 {
    30
}

/// Windowed check statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsAggregate {
    #[serde(default = "default_uptime")]
    pub uptime_percentage: f64,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub successful_checks: u64,
    #[serde(default)]
    pub failed_checks: u64,
    #[serde(default)]
    pub avg_response_time: f64,
    #[serde(default)]
    pub min_response_time: Option<f64>,
    #[serde(default)]
    pub max_response_time: Option<f64>,
}

fn default_uptime() -> f64 {
    100.0
}

impl Default for StatsAggregate {
    fn default() -> Self {
        Self {
            uptime_percentage: default_uptime(),
            total_checks: 0,
            successful_checks: 0,
            failed_checks: 0,
            avg_response_time: 0.0,
            min_response_time: None,
            max_response_time: None,
        }
    }
}

impl StatsAggregate {
    /// Bring backend-supplied counters into agreement with each other.
    ///
    /// `successful_checks` is trusted; `failed_checks` is derived from it and
    /// `total_checks`, and the uptime percentage is recomputed from the counters.
    pub fn normalized(mut self) -> Self {
        if self.successful_checks > self.total_checks {
            self.total_checks = self.successful_checks;
        }
        self.failed_checks = self.total_checks - self.successful_checks;
        self.uptime_percentage =
            crate::metrics::uptime_percentage(self.successful_checks, self.total_checks);
        if !self.avg_response_time.is_finite() || self.avg_response_time < 0.0 {
            self.avg_response_time = 0.0;
        }
        self
    }
}

/// A single point on the response-time chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "responseTime")]
    pub response_ms: Option<f64>,
    pub success: bool,
}

/// An incident as recorded by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    #[serde(default)]
    pub id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ongoing: bool,
}

/// Statistics window requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatsPeriod {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Day => "24h",
            StatsPeriod::Week => "7d",
            StatsPeriod::Month => "30d",
            StatsPeriod::Quarter => "90d",
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "24h" => Ok(StatsPeriod::Day),
            "7d" => Ok(StatsPeriod::Week),
            "30d" => Ok(StatsPeriod::Month),
            "90d" => Ok(StatsPeriod::Quarter),
            other => Err(format!(
                "Unknown period '{}', expected one of 24h, 7d, 30d, 90d",
                other
            )),
        }
    }
}

/// Point-in-time baseline of one monitor as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub monitor: Monitor,
    pub stats: StatsAggregate,
    pub chart_points: Vec<ChartPoint>,
    pub incidents: Vec<IncidentSummary>,
}
