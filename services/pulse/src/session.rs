//! Monitor session: one open view wired to a loader and the shared channel
//!
//! A session loads the baseline, joins the team room and then runs a single
//! task that owns every mutation of its engine: push events, channel
//! lifecycle notices and resync results are processed one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::channel::EventChannelClient;
use crate::config::Config;
use crate::engine::{
    new_engine_handle, CheckOutcome, EngineHandle, LiveView, ReconciliationEngine, ResyncStep,
};
use crate::error::{PulseError, Result};
use crate::events::ChannelEvent;
use crate::snapshot::SnapshotLoader;
use crate::types::{Snapshot, StatsPeriod};

/// Which monitor a session shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    pub team_id: String,
    pub monitor_id: String,
    pub period: StatsPeriod,
}

impl MonitorTarget {
    pub fn new(
        team_id: impl Into<String>,
        monitor_id: impl Into<String>,
        period: StatsPeriod,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            monitor_id: monitor_id.into(),
            period,
        }
    }
}

/// Inputs produced by helper tasks and fed back into the session task
#[derive(Debug)]
enum SessionInput {
    Fetched(Result<Snapshot>),
    RetryDue,
}

/// An open view. Dropping it without [`MonitorSession::close`] releases the
/// team room from a background task.
pub struct MonitorSession {
    target: MonitorTarget,
    engine: EngineHandle,
    channel: Arc<EventChannelClient>,
    revision: watch::Receiver<u64>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("target", &self.target)
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

impl MonitorSession {
    /// Open a view on `target`.
    ///
    /// A failure to load the initial snapshot is returned to the caller and
    /// nothing is left running.
    pub async fn open(
        loader: Arc<dyn SnapshotLoader>,
        channel: Arc<EventChannelClient>,
        target: MonitorTarget,
        config: &Config,
    ) -> Result<Self> {
        tracing::info!(
            "Opening view on monitor '{}' of team '{}' ({})",
            target.monitor_id,
            target.team_id,
            target.period
        );

        let mut engine = ReconciliationEngine::new(
            target.team_id.clone(),
            target.monitor_id.clone(),
            config.chart.retention,
            Backoff::from(&config.resync),
        );

        let snapshot = loader
            .load(&target.team_id, &target.monitor_id, target.period)
            .await?;
        let found = snapshot.monitor.id.clone();
        if !engine.initialize(snapshot) {
            return Err(PulseError::NotFound(format!(
                "backend answered with monitor '{}' for '{}'",
                found, target.monitor_id
            )));
        }

        // events published before this point are already folded into the snapshot
        let events = channel.subscribe();
        channel.join_team(&target.team_id).await?;

        let engine = new_engine_handle(engine);
        let cancel = CancellationToken::new();
        let (revision_tx, revision) = watch::channel(0u64);

        let task = SessionTask {
            engine: Arc::clone(&engine),
            loader,
            target: target.clone(),
            revision: revision_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run(events));

        Ok(Self {
            target,
            engine,
            channel,
            revision,
            cancel,
            task: Some(handle),
        })
    }

    pub fn target(&self) -> &MonitorTarget {
        &self.target
    }

    /// Shared read handle on the engine
    pub fn engine(&self) -> EngineHandle {
        Arc::clone(&self.engine)
    }

    /// Copy of the current view, `None` once closed
    pub async fn view(&self) -> Option<LiveView> {
        self.engine.read().await.view().cloned()
    }

    /// Receiver that ticks after every change to the view
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop processing, leave the team room and discard the view.
    ///
    /// Fetches still in flight are abandoned; their results are never applied.
    pub async fn close(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();
        self.engine.write().await.dispose();

        let left = self.channel.leave_team(&self.target.team_id).await;

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(
                    "Session task for '{}' ended abnormally: {}",
                    self.target.monitor_id,
                    e
                );
            }
        }
        tracing::info!("Closed view on monitor '{}'", self.target.monitor_id);
        left
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let engine = Arc::clone(&self.engine);
        let channel = Arc::clone(&self.channel);
        let target = self.target.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    engine.write().await.dispose();
                    if let Err(e) = channel.leave_team(&target.team_id).await {
                        tracing::warn!(
                            "Failed to leave team '{}' for dropped view on '{}': {}",
                            target.team_id,
                            target.monitor_id,
                            e
                        );
                    }
                    tracing::debug!("Released dropped view on '{}'", target.monitor_id);
                });
            }
            Err(_) => {
                tracing::warn!(
                    "View on '{}' dropped outside a runtime, team '{}' stays joined",
                    target.monitor_id,
                    target.team_id
                );
            }
        }
    }
}

struct SessionTask {
    engine: EngineHandle,
    loader: Arc<dyn SnapshotLoader>,
    target: MonitorTarget,
    revision: watch::Sender<u64>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(self, mut events: broadcast::Receiver<ChannelEvent>) {
        let (input_tx, mut inputs) = mpsc::channel::<SessionInput>(8);

        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(input) = inputs.recv() => self.on_input(input).await,
                received = events.recv() => match received {
                    Ok(event) => self.on_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            "View on '{}' missed {} channel events, resyncing",
                            self.target.monitor_id,
                            missed
                        );
                        self.engine.write().await.request_resync()
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!(
                            "Event channel closed, stopping view on '{}'",
                            self.target.monitor_id
                        );
                        break;
                    }
                },
            };
            self.drive(step, &input_tx);
        }

        tracing::debug!("Session task for '{}' stopped", self.target.monitor_id);
    }

    async fn on_event(&self, event: ChannelEvent) -> ResyncStep {
        match event {
            ChannelEvent::Check(check) => {
                let outcome = self.engine.write().await.apply_check(&check);
                if outcome != CheckOutcome::Ignored {
                    tracing::debug!(
                        "Check for '{}' at {}: success={} ({:?})",
                        check.monitor_id,
                        check.checked_at,
                        check.success,
                        outcome
                    );
                    self.bump();
                }
                ResyncStep::Idle
            }
            ChannelEvent::StatusChange(change) => {
                self.engine.write().await.apply_status_change(&change)
            }
            ChannelEvent::Reconnected => {
                tracing::info!("Channel reconnected, resyncing '{}'", self.target.monitor_id);
                self.engine.write().await.request_resync()
            }
            ChannelEvent::ConnectionLost { reason } => {
                tracing::debug!(
                    "View on '{}' lost its channel: {}",
                    self.target.monitor_id,
                    reason
                );
                ResyncStep::Idle
            }
            ChannelEvent::ReconnectFailed { reason } => {
                tracing::warn!(
                    "View on '{}' will stay stale, channel gave up: {}",
                    self.target.monitor_id,
                    reason
                );
                ResyncStep::Idle
            }
        }
    }

    async fn on_input(&self, input: SessionInput) -> ResyncStep {
        match input {
            SessionInput::Fetched(Ok(snapshot)) => {
                let (step, applied) = {
                    let mut engine = self.engine.write().await;
                    let generation = engine.generation();
                    let step = engine.complete_resync(snapshot);
                    (step, engine.generation() != generation)
                };
                if applied {
                    self.bump();
                }
                step
            }
            SessionInput::Fetched(Err(e)) => self.engine.write().await.fail_resync(&e),
            SessionInput::RetryDue => self.engine.write().await.resync_retry_due(),
        }
    }

    fn drive(&self, step: ResyncStep, inputs: &mpsc::Sender<SessionInput>) {
        match step {
            ResyncStep::Idle => {}
            ResyncStep::FetchNow => self.spawn_fetch(inputs.clone()),
            ResyncStep::RetryAfter(delay) => self.spawn_retry_timer(delay, inputs.clone()),
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn spawn_fetch(&self, inputs: mpsc::Sender<SessionInput>) {
        let loader = Arc::clone(&self.loader);
        let target = self.target.clone();
        let cancel = self.cancel.clone();
        tracing::debug!("Refetching snapshot for '{}'", target.monitor_id);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = loader.load(&target.team_id, &target.monitor_id, target.period) => {
                    let _ = inputs.send(SessionInput::Fetched(result)).await;
                }
            }
        });
    }

    fn spawn_retry_timer(&self, delay: Duration, inputs: mpsc::Sender<SessionInput>) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = inputs.send(SessionInput::RetryDue).await;
                }
            }
        });
    }
}
