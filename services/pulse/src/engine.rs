//! Reconciliation engine: folds push events onto a snapshot baseline
//!
//! One engine tracks one monitor of one team. It starts empty, becomes live on
//! [`ReconciliationEngine::initialize`], and every later snapshot replaces the
//! baseline outright so nothing applied before it can be counted twice.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::backoff::Backoff;
use crate::correlator::{IncidentCorrelator, ResyncState};
use crate::events::{CheckEvent, StatusChangeEvent};
use crate::metrics;
use crate::types::{
    ChartPoint, IncidentSummary, Monitor, MonitorStatus, Snapshot, StatsAggregate,
};

/// The reconciled view of one monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveView {
    pub monitor: Monitor,
    pub stats: StatsAggregate,
    pub chart: VecDeque<ChartPoint>,
    pub incidents: Vec<IncidentSummary>,
    /// Number of response times folded into `stats.avg_response_time`
    #[serde(skip)]
    pub response_samples: u64,
}

impl LiveView {
    fn from_snapshot(snapshot: Snapshot, retention: usize) -> Self {
        let stats = snapshot.stats.normalized();
        let response_samples = stats.successful_checks;
        Self {
            monitor: snapshot.monitor,
            stats,
            chart: metrics::retain_recent(snapshot.chart_points, retention),
            incidents: snapshot.incidents,
            response_samples,
        }
    }
}

/// Outcome of feeding one check event to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Applied,
    /// The event was counted but is older than the latest known check, so the
    /// live status fields were left alone
    AppliedLate,
    Ignored,
}

/// What the owner of the engine must do next about resynchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncStep {
    Idle,
    FetchNow,
    RetryAfter(Duration),
}

impl ResyncStep {
    fn fetch_if(start: bool) -> Self {
        if start {
            ResyncStep::FetchNow
        } else {
            ResyncStep::Idle
        }
    }
}

pub struct ReconciliationEngine {
    team_id: String,
    monitor_id: String,
    retention: usize,
    view: Option<LiveView>,
    correlator: IncidentCorrelator,
    disposed: bool,
    generation: u64,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("team_id", &self.team_id)
            .field("monitor_id", &self.monitor_id)
            .field("initialized", &self.view.is_some())
            .field("resync", &self.correlator.state())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl ReconciliationEngine {
    pub fn new(
        team_id: impl Into<String>,
        monitor_id: impl Into<String>,
        retention: usize,
        resync_backoff: Backoff,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            monitor_id: monitor_id.into(),
            retention: retention.max(1),
            view: None,
            correlator: IncidentCorrelator::new(resync_backoff),
            disposed: false,
            generation: 0,
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }

    pub fn is_initialized(&self) -> bool {
        self.view.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of snapshots applied so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self) -> Option<&LiveView> {
        self.view.as_ref()
    }

    pub fn monitor(&self) -> Option<&Monitor> {
        self.view.as_ref().map(|v| &v.monitor)
    }

    pub fn stats(&self) -> Option<&StatsAggregate> {
        self.view.as_ref().map(|v| &v.stats)
    }

    pub fn chart(&self) -> Option<&VecDeque<ChartPoint>> {
        self.view.as_ref().map(|v| &v.chart)
    }

    pub fn incidents(&self) -> Option<&[IncidentSummary]> {
        self.view.as_ref().map(|v| v.incidents.as_slice())
    }

    pub fn resync_state(&self) -> ResyncState {
        self.correlator.state()
    }

    fn accepts(&self, monitor_id: &str) -> bool {
        !self.disposed && self.view.is_some() && monitor_id == self.monitor_id
    }

    /// Replace the whole baseline with `snapshot`.
    ///
    /// Returns false if the engine is disposed or the snapshot belongs to a
    /// different monitor.
    pub fn initialize(&mut self, snapshot: Snapshot) -> bool {
        if self.disposed {
            tracing::debug!("Discarding snapshot for disposed monitor '{}'", self.monitor_id);
            return false;
        }
        if snapshot.monitor.id != self.monitor_id {
            tracing::warn!(
                "Snapshot for monitor '{}' does not match tracked monitor '{}'",
                snapshot.monitor.id,
                self.monitor_id
            );
            return false;
        }

        let view = LiveView::from_snapshot(snapshot, self.retention);
        tracing::debug!(
            "Baseline for '{}': status={}, checks={}/{}, uptime={:.2}%",
            self.monitor_id,
            view.monitor.last_status,
            view.stats.successful_checks,
            view.stats.total_checks,
            view.stats.uptime_percentage
        );
        self.view = Some(view);
        self.generation += 1;
        true
    }

    /// Fold one check result into the live view
    pub fn apply_check(&mut self, event: &CheckEvent) -> CheckOutcome {
        if !self.accepts(&event.monitor_id) {
            return CheckOutcome::Ignored;
        }
        let retention = self.retention;
        let Some(view) = self.view.as_mut() else {
            return CheckOutcome::Ignored;
        };

        let (stats, samples) = metrics::fold_check(
            &view.stats,
            view.response_samples,
            event.success,
            event.response_ms,
        );
        view.stats = stats;
        view.response_samples = samples;

        metrics::push_ordered(
            &mut view.chart,
            ChartPoint {
                timestamp: event.checked_at,
                response_ms: event.response_ms,
                success: event.success,
            },
            retention,
        );

        let is_latest = view
            .monitor
            .last_checked_at
            .map_or(true, |last| event.checked_at >= last);
        if !is_latest {
            tracing::debug!(
                "Late check for '{}' at {} (latest {:?})",
                self.monitor_id,
                event.checked_at,
                view.monitor.last_checked_at
            );
            return CheckOutcome::AppliedLate;
        }

        view.monitor.last_status = if event.success {
            MonitorStatus::Up
        } else {
            MonitorStatus::Down
        };
        view.monitor.last_checked_at = Some(event.checked_at);
        view.monitor.last_response_ms = event.response_ms;
        view.monitor.last_error = event.error.clone();
        CheckOutcome::Applied
    }

    /// Record a status change for the tracked monitor
    pub fn apply_status_change(&mut self, event: &StatusChangeEvent) -> ResyncStep {
        if !self.accepts(&event.monitor_id) {
            return ResyncStep::Idle;
        }
        tracing::debug!("Status change for '{}', incidents may be stale", self.monitor_id);
        ResyncStep::fetch_if(self.correlator.request_resync())
    }

    /// Ask for a refetch for reasons other than a status change: a reconnect
    /// or events missed by a lagging subscriber
    pub fn request_resync(&mut self) -> ResyncStep {
        if self.disposed || self.view.is_none() {
            return ResyncStep::Idle;
        }
        ResyncStep::fetch_if(self.correlator.request_resync())
    }

    /// A scheduled retry fired
    pub fn resync_retry_due(&mut self) -> ResyncStep {
        if self.disposed {
            return ResyncStep::Idle;
        }
        ResyncStep::fetch_if(self.correlator.retry_due())
    }

    /// Apply the snapshot a refetch produced
    pub fn complete_resync(&mut self, snapshot: Snapshot) -> ResyncStep {
        if self.disposed {
            return ResyncStep::Idle;
        }
        let found = snapshot.monitor.id.clone();
        if !self.initialize(snapshot) {
            return self.fail_resync(&crate::PulseError::NotFound(format!(
                "resync returned monitor '{}'",
                found
            )));
        }
        tracing::debug!("Resync of '{}' applied", self.monitor_id);
        ResyncStep::fetch_if(self.correlator.resync_succeeded())
    }

    /// Record a failed refetch; the current view is kept as is
    pub fn fail_resync(&mut self, error: &crate::PulseError) -> ResyncStep {
        if self.disposed {
            return ResyncStep::Idle;
        }
        match self.correlator.resync_failed() {
            Some(delay) => {
                tracing::warn!(
                    "Resync of '{}' failed (attempt {}): {}; retrying in {:?}",
                    self.monitor_id,
                    self.correlator.failures(),
                    error,
                    delay
                );
                ResyncStep::RetryAfter(delay)
            }
            None => {
                tracing::warn!(
                    "Resync of '{}' failed (attempt {}): {}; giving up until the next status change",
                    self.monitor_id,
                    self.correlator.failures(),
                    error
                );
                ResyncStep::Idle
            }
        }
    }

    /// Discard the view. Every later call is a no-op.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.view = None;
        self.correlator.reset();
    }
}

/// Engine shared between the session task and readers
pub type EngineHandle = Arc<RwLock<ReconciliationEngine>>;

pub fn new_engine_handle(engine: ReconciliationEngine) -> EngineHandle {
    Arc::new(RwLock::new(engine))
}
