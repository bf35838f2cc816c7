//! Snapshot loader: point-in-time monitor, statistics and incidents from the REST backend

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PulseError, Result};
use crate::io::{HttpClient, HttpResponse};
use crate::types::{ChartPoint, IncidentSummary, Monitor, Snapshot, StatsAggregate, StatsPeriod};

/// Source of authoritative monitor baselines
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotLoader: Send + Sync {
    /// Fetch the current snapshot. Safe to call repeatedly.
    async fn load(&self, team_id: &str, monitor_id: &str, period: StatsPeriod) -> Result<Snapshot>;
}

/// `GET /teams/{team}/monitors/{id}` answers either wrapped or bare
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MonitorPayload {
    Wrapped { monitor: Monitor },
    Bare(Monitor),
}

impl MonitorPayload {
    fn into_monitor(self) -> Monitor {
        match self {
            MonitorPayload::Wrapped { monitor } => monitor,
            MonitorPayload::Bare(monitor) => monitor,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsPayload {
    stats: StatsAggregate,
    #[serde(default)]
    chart_data: Vec<ChartPoint>,
    #[serde(default)]
    incidents: Vec<IncidentSummary>,
}

/// Loads snapshots from the dashboard REST API
pub struct RestSnapshotLoader {
    base_url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for RestSnapshotLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSnapshotLoader")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RestSnapshotLoader {
    pub fn new(base_url: &str, http: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn monitor_url(&self, team_id: &str, monitor_id: &str) -> String {
        format!("{}/teams/{}/monitors/{}", self.base_url, team_id, monitor_id)
    }

    fn stats_url(&self, team_id: &str, monitor_id: &str, period: StatsPeriod) -> String {
        format!(
            "{}/stats?period={}",
            self.monitor_url(team_id, monitor_id),
            period
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self.http.get(url).await?;
        check_status(&response, what)?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

fn check_status(response: &HttpResponse, what: &str) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        404 => Err(PulseError::NotFound(what.to_string())),
        401 | 403 => Err(PulseError::Unauthorized(format!(
            "{} (HTTP {})",
            what, response.status
        ))),
        status => Err(PulseError::Http(format!("{} returned HTTP {}", what, status))),
    }
}

#[async_trait]
impl SnapshotLoader for RestSnapshotLoader {
    async fn load(&self, team_id: &str, monitor_id: &str, period: StatsPeriod) -> Result<Snapshot> {
        let what = format!("monitor '{}' of team '{}'", monitor_id, team_id);
        tracing::debug!("Loading snapshot for {} ({})", what, period);

        let monitor = self
            .get_json::<MonitorPayload>(&self.monitor_url(team_id, monitor_id), &what)
            .await?
            .into_monitor();
        let stats = self
            .get_json::<StatsPayload>(&self.stats_url(team_id, monitor_id, period), &what)
            .await?;

        tracing::debug!(
            "Loaded snapshot for {}: {} chart points, {} incidents",
            what,
            stats.chart_data.len(),
            stats.incidents.len()
        );

        Ok(Snapshot {
            monitor,
            stats: stats.stats,
            chart_points: stats.chart_data,
            incidents: stats.incidents,
        })
    }
}
