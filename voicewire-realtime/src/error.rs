//! Error types for the realtime client stack.

use thiserror::Error;

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur across the realtime client stack.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// Connection setup or lifecycle error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A payload did not satisfy the event envelope contract.
    #[error("{0}")]
    EnvelopeError(String),

    /// Transport-level failure (peer connection, data channel, media).
    #[error("Transport error: {0}")]
    TransportError(String),

    /// SDP signaling exchange failure.
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Audio capture or playback failure.
    #[error("Audio error: {0}")]
    AudioError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Create a new connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a new envelope error.
    pub fn envelope<S: Into<String>>(msg: S) -> Self {
        Self::EnvelopeError(msg.into())
    }

    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create a new signaling error.
    pub fn signaling<S: Into<String>>(msg: S) -> Self {
        Self::SignalingError(msg.into())
    }

    /// Create a new audio error.
    pub fn audio<S: Into<String>>(msg: S) -> Self {
        Self::AudioError(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }
}
