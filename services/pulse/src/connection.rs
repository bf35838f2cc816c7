//! Connection management for the event channel
//!
//! This module owns the reader task that turns frames into [`ChannelEvent`]s
//! and the reconnection task that restores the connection and team
//! memberships after a drop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ChannelConfig;
use crate::error::Result;
use crate::events::{ChannelEvent, ClientMessage, ServerMessage};
use crate::io::{ConnectionFactory, FrameReader, FrameWriter};

/// Capacity of the broadcast buffer handed to subscribers
pub(crate) const EVENT_BUFFER: usize = 256;

/// Internal connection state
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionState {
    pub connected: bool,
    pub reconnecting: bool,
}

/// State shared between the client, the reader task and the reconnect task
#[derive(Clone)]
pub(crate) struct SharedConnectionState {
    pub state: Arc<RwLock<ConnectionState>>,
    pub writer: Arc<Mutex<Option<Box<dyn FrameWriter>>>>,
    /// Joined teams with the number of views holding each membership
    pub teams: Arc<Mutex<BTreeMap<String, usize>>>,
    pub event_sender: broadcast::Sender<ChannelEvent>,
    pub reader_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub reconnect_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub auto_reconnect_enabled: Arc<AtomicBool>,
    pub connection_factory: Arc<dyn ConnectionFactory>,
}

impl SharedConnectionState {
    pub fn new(
        auto_reconnect_enabled: bool,
        connection_factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(RwLock::new(ConnectionState::default())),
            writer: Arc::new(Mutex::new(None)),
            teams: Arc::new(Mutex::new(BTreeMap::new())),
            event_sender,
            reader_handle: Arc::new(Mutex::new(None)),
            reconnect_handle: Arc::new(Mutex::new(None)),
            auto_reconnect_enabled: Arc::new(AtomicBool::new(auto_reconnect_enabled)),
            connection_factory,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    pub async fn is_reconnecting(&self) -> bool {
        self.state.read().await.reconnecting
    }

    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect_enabled.load(Ordering::SeqCst)
    }

    pub fn set_auto_reconnect_enabled(&self, enabled: bool) {
        debug!("Setting auto-reconnect enabled: {}", enabled);
        self.auto_reconnect_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Send one client message if a connection is up.
    ///
    /// Returns `Ok(false)` when there is no connection; the message is then
    /// covered by the re-join performed on the next connect.
    pub async fn send(&self, message: &ClientMessage) -> Result<bool> {
        let frame = serde_json::to_string(message)?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                debug!("Sending {}", frame);
                w.write_frame(&frame).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Send `join` for every team currently held
    pub async fn rejoin_all(&self) -> Result<()> {
        let teams: Vec<String> = self.teams.lock().await.keys().cloned().collect();
        for team_id in teams {
            debug!("Re-joining team '{}'", team_id);
            self.send(&ClientMessage::Join { team_id }).await?;
        }
        Ok(())
    }

    /// Install a fresh connection: store the writer, start the reader and
    /// re-join all held teams
    pub async fn install(
        &self,
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
        config: ChannelConfig,
    ) -> Result<()> {
        {
            let mut writer_guard = self.writer.lock().await;
            *writer_guard = Some(writer);
        }
        {
            let mut state = self.state.write().await;
            state.connected = true;
            state.reconnecting = false;
        }

        let reader_handle = spawn_reader_task(reader, config, self.clone());
        {
            let mut handle = self.reader_handle.lock().await;
            if let Some(old) = handle.replace(reader_handle) {
                old.abort();
            }
        }

        self.rejoin_all().await
    }

    /// Stop both background tasks and close the writer
    pub async fn shutdown(&self) {
        if let Some(h) = self.reconnect_handle.lock().await.take() {
            h.abort();
        }
        if let Some(h) = self.reader_handle.lock().await.take() {
            h.abort();
        }
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }
        *self.state.write().await = ConnectionState::default();
    }
}

/// Spawn a reader task that forwards server frames to subscribers
pub(crate) fn spawn_reader_task(
    mut reader: Box<dyn FrameReader>,
    config: ChannelConfig,
    shared: SharedConnectionState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let disconnect_reason = loop {
            match reader.read_frame().await {
                Ok(None) => break "Connection closed by remote".to_string(),
                Ok(Some(frame)) => {
                    if frame.trim().is_empty() {
                        continue;
                    }
                    if let Some(message) = ServerMessage::parse(&frame) {
                        // no subscribers is not an error
                        let _ = shared.event_sender.send(message.into());
                    }
                }
                Err(e) => break format!("Read error: {}", e),
            }
        };

        {
            let mut state = shared.state.write().await;
            state.connected = false;
        }
        if let Some(mut w) = shared.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }

        warn!("Event channel connection lost: {}", disconnect_reason);
        let _ = shared.event_sender.send(ChannelEvent::ConnectionLost {
            reason: disconnect_reason,
        });

        if shared.is_auto_reconnect_enabled() {
            debug!("Auto-reconnect enabled, starting reconnection task");
            let task = spawn_reconnect_task(config, shared.clone());
            let mut handle = shared.reconnect_handle.lock().await;
            if let Some(old) = handle.replace(task) {
                old.abort();
            }
        }
    })
}

/// Spawn a reconnection task with capped exponential backoff between attempts
pub(crate) fn spawn_reconnect_task(
    config: ChannelConfig,
    shared: SharedConnectionState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        {
            let mut state = shared.state.write().await;
            state.reconnecting = true;
        }

        let backoff = Backoff::from(&config.reconnect);
        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let mut attempt = 0u32;

        let reason = loop {
            if !shared.is_auto_reconnect_enabled() {
                break "Auto-reconnect disabled".to_string();
            }
            if !backoff.allows(attempt) {
                break format!("Max retries ({}) exceeded", attempt);
            }
            attempt += 1;

            if attempt > 1 {
                tokio::time::sleep(backoff.delay(attempt - 1)).await;
            }

            info!(
                "Reconnecting to event channel (attempt {}/{})",
                attempt,
                backoff
                    .max_attempts()
                    .map_or("unlimited".to_string(), |m| m.to_string())
            );

            match shared.connection_factory.connect(&config.url, timeout).await {
                Ok(pair) => match shared.install(pair.reader, pair.writer, config.clone()).await {
                    Ok(()) => {
                        info!("Reconnected to event channel");
                        let _ = shared.event_sender.send(ChannelEvent::Reconnected);
                        return;
                    }
                    Err(e) => {
                        // the new reader will notice the broken connection and start over
                        warn!("Re-joining teams after reconnect failed: {}", e);
                        return;
                    }
                },
                Err(e) => debug!("Reconnect attempt {} failed: {}", attempt, e),
            }
        };

        warn!("Event channel reconnection failed: {}", reason);
        {
            let mut state = shared.state.write().await;
            state.reconnecting = false;
        }
        let _ = shared
            .event_sender
            .send(ChannelEvent::ReconnectFailed { reason });
    })
}
