//! Push channel wire messages and the typed events handed to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a single check, as pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEvent {
    pub monitor_id: String,
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub response_ms: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Signal that a monitor's discrete state changed on the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    pub monitor_id: String,
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Check(CheckEvent),
    StatusChange(StatusChangeEvent),
}

impl ServerMessage {
    /// Parse one text frame, returning `None` for anything that is not a
    /// well-formed `check` or `status_change` message
    pub fn parse(frame: &str) -> Option<Self> {
        match serde_json::from_str(frame) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!("Dropping unrecognized frame ({}): {}", e, frame);
                None
            }
        }
    }
}

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    Leave {
        #[serde(rename = "teamId")]
        team_id: String,
    },
}

/// Events broadcast by the event channel client
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Check(CheckEvent),
    StatusChange(StatusChangeEvent),
    /// The channel came back after a drop and every joined team was re-joined
    Reconnected,
    /// The physical connection dropped
    ConnectionLost { reason: String },
    /// Automatic reconnection gave up
    ReconnectFailed { reason: String },
}

impl From<ServerMessage> for ChannelEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::Check(event) => ChannelEvent::Check(event),
            ServerMessage::StatusChange(event) => ChannelEvent::StatusChange(event),
        }
    }
}
