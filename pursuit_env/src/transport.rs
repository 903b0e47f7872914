//! Live-channel transport abstraction for the pursuit viewer.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::ChannelEvent;

/// Abstraction for the duplex live channel between viewer and backend.
///
/// # Implementations
///
/// - **Production**: wraps a tokio-tungstenite WebSocket stream
/// - **Tests**: channel-based double with scripted connect outcomes
///
/// # Frame flow
///
/// ```text
/// Session task                Transport                 Backend
///   |                            |                         |
///   |-- connect(url) ----------->|-- handshake ----------->|
///   |<- Box<dyn LiveChannel> ----|                         |
///   |-- send_text(heartbeat) --->|------------------------>|
///   |                            |<----- state frame ------|
///   |<- recv() = Text(..) -------|                         |
/// ```
#[async_trait]
pub trait LiveTransport: Send + Sync + 'static {
    /// Opens a new duplex channel to the given URL.
    ///
    /// # Returns
    /// * `Ok(channel)` - handshake completed, the channel is established
    /// * `Err(EnvError)` - the channel could not be opened; the caller
    ///   decides whether this is terminal or retried
    async fn connect(&self, url: &str) -> Result<Box<dyn LiveChannel>, EnvError>;
}

/// One established duplex channel.
///
/// A channel is owned by exactly one session task; no locking is needed.
#[async_trait]
pub trait LiveChannel: Send {
    /// Sends a text frame.
    ///
    /// # Returns
    /// * `Err(EnvError::Transport)` - the link is no longer writable;
    ///   the session treats this as a dead connection
    async fn send_text(&mut self, text: String) -> Result<(), EnvError>;

    /// Receives the next channel event.
    ///
    /// # Returns
    /// * `Some(ChannelEvent::Text)` - an inbound text frame
    /// * `Some(ChannelEvent::Error)` - a transport-level error; the
    ///   stream ends shortly after
    /// * `Some(ChannelEvent::Closed)` - the peer sent a close frame
    /// * `None` - the stream ended without a close frame
    ///
    /// # Blocking
    /// Pends until an event arrives or the stream ends. Must be
    /// cancel-safe: the session polls it inside `select!`.
    async fn recv(&mut self) -> Option<ChannelEvent>;

    /// Requests closure with the given close code.
    ///
    /// Idempotent; closing an already-closed channel is not an error the
    /// caller acts on.
    async fn close(&mut self, code: u16) -> Result<(), EnvError>;
}
