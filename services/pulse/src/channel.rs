//! Event channel client: one shared push connection with per-team subscriptions

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::connection::SharedConnectionState;
use crate::error::Result;
use crate::events::{ChannelEvent, ClientMessage};
use crate::io::{ConnectionFactory, WsConnectionFactory};

/// Client for the push channel delivering `check` and `status_change` events.
///
/// One instance is shared by every open monitor view. Team memberships are
/// reference counted: the `join` frame goes out for the first view on a team
/// and the `leave` frame only when the last one releases it.
pub struct EventChannelClient {
    config: ChannelConfig,
    shared: SharedConnectionState,
}

impl std::fmt::Debug for EventChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannelClient")
            .field("url", &self.config.url)
            .finish()
    }
}

impl EventChannelClient {
    /// Create a client using the WebSocket transport
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_connection_factory(config, Arc::new(WsConnectionFactory::new()))
    }

    /// Create a client with a custom connection factory
    pub fn with_connection_factory(
        config: ChannelConfig,
        connection_factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let shared = SharedConnectionState::new(config.reconnect.enabled, connection_factory);
        Self { config, shared }
    }

    /// Open the physical channel. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        if self.shared.is_connected().await {
            debug!("Event channel already connected");
            return Ok(());
        }
        if let Some(h) = self.shared.reconnect_handle.lock().await.take() {
            h.abort();
        }
        self.shared
            .set_auto_reconnect_enabled(self.config.reconnect.enabled);

        debug!("Connecting to event channel at {}", self.config.url);
        let timeout = Duration::from_secs(self.config.connection_timeout_seconds);
        let pair = self
            .shared
            .connection_factory
            .connect(&self.config.url, timeout)
            .await?;

        self.shared
            .install(pair.reader, pair.writer, self.config.clone())
            .await?;
        debug!("Event channel connected and reader task started");
        Ok(())
    }

    /// Tear the channel down and drop every team membership
    pub async fn disconnect(&self) -> Result<()> {
        debug!("Disconnecting event channel");
        self.shared.set_auto_reconnect_enabled(false);
        self.shared.teams.lock().await.clear();
        self.shared.shutdown().await;
        debug!("Event channel disconnected");
        Ok(())
    }

    /// Start receiving events for `team_id`
    pub async fn join_team(&self, team_id: &str) -> Result<()> {
        let first = {
            let mut teams = self.shared.teams.lock().await;
            let holders = teams.entry(team_id.to_string()).or_insert(0);
            *holders += 1;
            *holders == 1
        };
        if first {
            let sent = self
                .shared
                .send(&ClientMessage::Join {
                    team_id: team_id.to_string(),
                })
                .await?;
            debug!("Joined team '{}' (sent={})", team_id, sent);
        }
        Ok(())
    }

    /// Release one membership of `team_id`
    pub async fn leave_team(&self, team_id: &str) -> Result<()> {
        let last = {
            let mut teams = self.shared.teams.lock().await;
            match teams.get_mut(team_id) {
                Some(holders) if *holders > 1 => {
                    *holders -= 1;
                    false
                }
                Some(_) => {
                    teams.remove(team_id);
                    true
                }
                None => false,
            }
        };
        if last {
            let sent = self
                .shared
                .send(&ClientMessage::Leave {
                    team_id: team_id.to_string(),
                })
                .await?;
            debug!("Left team '{}' (sent={})", team_id, sent);
        }
        Ok(())
    }

    /// Subscribe to channel events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.event_sender.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.is_connected().await
    }

    pub async fn is_reconnecting(&self) -> bool {
        self.shared.is_reconnecting().await
    }

    /// Teams with at least one active membership
    pub async fn joined_teams(&self) -> Vec<String> {
        self.shared.teams.lock().await.keys().cloned().collect()
    }

    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.shared.is_auto_reconnect_enabled()
    }

    pub fn set_auto_reconnect_enabled(&self, enabled: bool) {
        self.shared.set_auto_reconnect_enabled(enabled);
    }
}
