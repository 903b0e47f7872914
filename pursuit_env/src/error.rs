//! Error types for the pursuit environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, Error)]
pub enum EnvError {
    /// The channel handshake failed (refused, DNS, TLS, bad URL)
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Send or receive failed on an established channel
    #[error("Transport error: {0}")]
    Transport(String),

    /// The channel is closed and cannot carry frames
    #[error("Channel closed")]
    Closed,

    /// Frame encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EnvError {
    /// Creates a handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
