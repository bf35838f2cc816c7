//! BDD test world for pulse

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use cucumber::World;
use pulse::backoff::Backoff;
use pulse::engine::{CheckOutcome, ReconciliationEngine, ResyncStep};
use pulse::types::{IncidentSummary, Monitor, MonitorStatus, Snapshot, StatsAggregate};

pub const TEAM: &str = "team-1";

#[derive(Debug, Default, World)]
pub struct PulseWorld {
    pub engine: Option<ReconciliationEngine>,
    pub retention: Option<usize>,
    pub last_outcome: Option<CheckOutcome>,
    pub last_step: Option<ResyncStep>,
    /// Seconds offset of the most recent check sent
    pub clock: i64,
}

impl PulseWorld {
    pub fn engine(&mut self) -> &mut ReconciliationEngine {
        self.engine.as_mut().expect("engine not created")
    }

    pub fn create_engine(&mut self, monitor_id: &str) {
        self.engine = Some(ReconciliationEngine::new(
            TEAM,
            monitor_id,
            self.retention.unwrap_or(100),
            Backoff::new(Duration::from_millis(50), Duration::from_secs(1)),
        ));
    }

    pub fn next_time(&mut self) -> DateTime<Utc> {
        self.clock += 60;
        at(self.clock)
    }
}

pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_560_000 + offset_secs, 0).unwrap()
}

pub fn snapshot(
    monitor_id: &str,
    status: MonitorStatus,
    total: u64,
    successful: u64,
    incidents: Vec<IncidentSummary>,
) -> Snapshot {
    Snapshot {
        monitor: Monitor {
            last_status: status,
            last_checked_at: Some(at(0)),
            ..Monitor::new(monitor_id, "https://example.com/health")
        },
        stats: StatsAggregate {
            total_checks: total,
            successful_checks: successful,
            failed_checks: total.saturating_sub(successful),
            avg_response_time: 120.0,
            min_response_time: Some(80.0),
            max_response_time: Some(200.0),
            ..StatsAggregate::default()
        },
        chart_points: vec![],
        incidents,
    }
}

pub fn parse_status(status: &str) -> MonitorStatus {
    match status {
        "up" => MonitorStatus::Up,
        "down" => MonitorStatus::Down,
        _ => MonitorStatus::Pending,
    }
}
