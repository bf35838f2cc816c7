//! I/O traits and implementations
//!
//! The snapshot loader talks to the backend through [`HttpClient`] and the
//! event channel talks to the push server through [`ConnectionFactory`],
//! [`FrameReader`] and [`FrameWriter`]. Tests substitute mocks for all of them;
//! production uses reqwest and a WebSocket connection.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{PulseError, Result};

// ============================================================================
// HttpClient
// ============================================================================

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a GET request to the given URL
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    bearer_token: Option<String>,
    timeout: Option<Duration>,
}

impl ReqwestHttpClient {
    pub fn new(bearer_token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer_token,
            timeout: Some(timeout),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PulseError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PulseError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Push channel transport
// ============================================================================

/// Connection pair containing a reader and writer
pub struct ConnectionPair {
    /// Reader for receiving frames
    pub reader: Box<dyn FrameReader>,
    /// Writer for sending frames
    pub writer: Box<dyn FrameWriter>,
}

/// Trait for reading text frames from the push channel
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FrameReader: Send {
    /// Read the next text frame
    ///
    /// Returns `Ok(Some(frame))` for a frame, `Ok(None)` once the remote
    /// closed the connection, or an error if reading failed.
    async fn read_frame(&mut self) -> Result<Option<String>>;
}

/// Trait for writing text frames to the push channel
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FrameWriter: Send {
    /// Send one text frame
    async fn write_frame(&mut self, frame: &str) -> Result<()>;

    /// Close the writing side
    async fn shutdown(&mut self) -> Result<()>;
}

/// Trait for opening push channel connections
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionFactory: Send + Sync {
    /// Connect to `url`, failing if the handshake takes longer than `timeout`
    async fn connect(&self, url: &str, timeout: Duration) -> Result<ConnectionPair>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket implementation of FrameReader
pub struct WsFrameReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Event channel closed by server: {:?}", frame);
                    return Ok(None);
                }
                // ping/pong are answered by tungstenite; binary frames are not part of the protocol
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(PulseError::Channel(e.to_string())),
            }
        }
    }
}

/// WebSocket implementation of FrameWriter
pub struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, frame: &str) -> Result<()> {
        self.sink
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| PulseError::SendError(e.to_string()))
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| PulseError::SendError(e.to_string()))
    }
}

/// WebSocket implementation of ConnectionFactory
#[derive(Default, Clone)]
pub struct WsConnectionFactory;

impl WsConnectionFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for WsConnectionFactory {
    async fn connect(&self, url: &str, timeout: Duration) -> Result<ConnectionPair> {
        debug!("Connecting to {} with timeout {:?}", url, timeout);

        let (stream, response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| PulseError::Timeout(format!("Connection to {} timed out", url)))?
                .map_err(|e| {
                    PulseError::ConnectionFailed(format!("Failed to connect to {}: {}", url, e))
                })?;

        debug!(
            "WebSocket connection established to {} (HTTP {})",
            url,
            response.status()
        );

        let (sink, stream) = stream.split();
        Ok(ConnectionPair {
            reader: Box::new(WsFrameReader { stream }),
            writer: Box::new(WsFrameWriter { sink }),
        })
    }
}
