//! Hand-written transports and loaders shared by the integration tests.
//!
//! Nothing here opens a socket, so the suites using it can run under miri.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pulse::config::ChannelConfig;
use pulse::engine::LiveView;
use pulse::events::ChannelEvent;
use pulse::io::{ConnectionFactory, ConnectionPair, FrameReader, FrameWriter};
use pulse::snapshot::SnapshotLoader;
use pulse::types::{IncidentSummary, Monitor, MonitorStatus, Snapshot, StatsAggregate, StatsPeriod};
use pulse::{MonitorSession, PulseError};
use tokio::sync::{broadcast, mpsc, Notify};

pub const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Channel transport
// ============================================================================

/// Reader fed by the test; `None` or a dropped sender reads as EOF
struct ScriptedReader {
    frames: mpsc::UnboundedReceiver<Option<String>>,
}

#[async_trait]
impl FrameReader for ScriptedReader {
    async fn read_frame(&mut self) -> pulse::Result<Option<String>> {
        match self.frames.recv().await {
            Some(Some(frame)) => Ok(Some(frame)),
            Some(None) | None => Ok(None),
        }
    }
}

/// Writer that records every frame sent
struct RecordingWriter {
    sent: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl FrameWriter for RecordingWriter {
    async fn write_frame(&mut self, frame: &str) -> pulse::Result<()> {
        self.sent.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn shutdown(&mut self) -> pulse::Result<()> {
        Ok(())
    }
}

/// The server side of one scripted connection
pub struct ServerEnd {
    frames: mpsc::UnboundedSender<Option<String>>,
    sent: Arc<StdMutex<Vec<String>>>,
}

impl ServerEnd {
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.frames.send(Some(frame.into()));
    }

    /// Drop the connection from the server side
    pub fn close(&self) {
        let _ = self.frames.send(None);
    }

    /// Frames the client has sent on this connection
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

type ScriptedPair = (
    mpsc::UnboundedReceiver<Option<String>>,
    Arc<StdMutex<Vec<String>>>,
);

/// Factory handing out pre-registered connections in order
pub struct ScriptedFactory {
    pairs: StdMutex<VecDeque<ScriptedPair>>,
    attempts: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            pairs: StdMutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn add_connection(&self) -> ServerEnd {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        self.pairs.lock().unwrap().push_back((rx, Arc::clone(&sent)));
        ServerEnd { frames: tx, sent }
    }

    /// Connection attempts so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(&self, _url: &str, _timeout: Duration) -> pulse::Result<ConnectionPair> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.pairs.lock().unwrap().pop_front();
        match next {
            Some((frames, sent)) => Ok(ConnectionPair {
                reader: Box::new(ScriptedReader { frames }),
                writer: Box::new(RecordingWriter { sent }),
            }),
            None => Err(PulseError::ConnectionFailed(
                "No scripted connections left".to_string(),
            )),
        }
    }
}

pub fn channel_config(auto_reconnect: bool) -> ChannelConfig {
    let mut config = ChannelConfig::default();
    config.connection_timeout_seconds = 1;
    config.reconnect.enabled = auto_reconnect;
    config.reconnect.initial_delay_ms = 10;
    config.reconnect.max_delay_ms = 50;
    config
}

pub async fn next_event(events: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a channel event")
        .expect("event channel closed")
}

// ============================================================================
// Frames and snapshots
// ============================================================================

pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_560_000 + offset_secs, 0).unwrap()
}

pub fn check_frame(
    monitor_id: &str,
    offset_secs: i64,
    success: bool,
    response_ms: Option<f64>,
) -> String {
    let error = if success { None } else { Some("timeout") };
    serde_json::json!({
        "event": "check",
        "data": {
            "monitorId": monitor_id,
            "checkedAt": at(offset_secs),
            "success": success,
            "responseMs": response_ms,
            "error": error,
        }
    })
    .to_string()
}

pub fn status_change_frame(monitor_id: &str) -> String {
    serde_json::json!({ "event": "status_change", "data": { "monitorId": monitor_id } }).to_string()
}

pub fn join_frame(team_id: &str) -> String {
    format!(r#"{{"type":"join","teamId":"{}"}}"#, team_id)
}

pub fn leave_frame(team_id: &str) -> String {
    format!(r#"{{"type":"leave","teamId":"{}"}}"#, team_id)
}

pub fn snapshot(
    monitor_id: &str,
    status: MonitorStatus,
    total: u64,
    successful: u64,
    ongoing: usize,
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
            failed_checks: total - successful,
            avg_response_time: 120.0,
            min_response_time: Some(80.0),
            max_response_time: Some(200.0),
            ..StatsAggregate::default()
        },
        chart_points: vec![],
        incidents: (0..ongoing)
            .map(|i| IncidentSummary {
                id: Some(format!("inc-{}", i)),
                started_at: at(i as i64),
                ended_at: None,
                error: Some("timeout".to_string()),
                ongoing: true,
            })
            .collect(),
    }
}

// ============================================================================
// Snapshot loader
// ============================================================================

/// Loader answering from a queue. Calls from `gate_from` on are held back
/// until the test releases them one by one.
pub struct ScriptedLoader {
    responses: StdMutex<VecDeque<pulse::Result<Snapshot>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    gate_from: usize,
}

impl ScriptedLoader {
    pub fn new(responses: Vec<pulse::Result<Snapshot>>) -> Self {
        Self {
            responses: StdMutex::new(responses.into_iter().collect()),
            calls: AtomicUsize::new(0),
            gate: None,
            gate_from: 0,
        }
    }

    /// Hold every refetch; the initial load answers at once
    pub fn gated(responses: Vec<pulse::Result<Snapshot>>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            gate_from: 1,
            ..Self::new(responses)
        }
    }

    /// Hold every call, the initial load included
    pub fn held(responses: Vec<pulse::Result<Snapshot>>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            gate_from: 0,
            ..Self::new(responses)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotLoader for ScriptedLoader {
    async fn load(
        &self,
        _team_id: &str,
        _monitor_id: &str,
        _period: StatsPeriod,
    ) -> pulse::Result<Snapshot> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.gate_from {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(PulseError::Http("no scripted snapshot left".to_string())))
    }
}

/// Wait until the session's view satisfies `ready`
pub async fn wait_for_view<F>(session: &MonitorSession, ready: F) -> LiveView
where
    F: Fn(&LiveView) -> bool,
{
    let mut changes = session.changes();
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(view) = session.view().await {
                if ready(&view) {
                    return view;
                }
            }
            changes.changed().await.expect("session task stopped");
        }
    })
    .await
    .expect("timed out waiting for the view")
}

/// Wait until `condition` holds, polling briefly
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
