//! Abstract transport contracts.
//!
//! The client consumes peer-connection, data-channel, and media surfaces
//! through these traits only. A concrete adapter layer translates platform
//! WebRTC APIs onto them; tests substitute deterministic doubles. Platform
//! state is injected at construction time, so nothing in the core reaches
//! into ambient globals.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Peer connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Data channel readiness states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Media kinds a transceiver can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Transceiver directionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

/// Session description kinds exchanged during signaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// A textual session description.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpType::Answer, sdp: sdp.into() }
    }
}

/// Callback invoked with no arguments (open/close hooks).
pub type Hook = Box<dyn Fn() + Send + Sync>;
/// Callback invoked with an inbound text frame.
pub type MessageHook = Box<dyn Fn(String) + Send + Sync>;
/// Callback invoked with a transport error description.
pub type ErrorHook = Box<dyn Fn(String) + Send + Sync>;
/// Callback invoked on peer connection state transitions.
pub type StateHook = Box<dyn Fn(ConnectionState) + Send + Sync>;
/// Callback invoked when a remote media stream arrives.
pub type TrackHook = Box<dyn Fn(Arc<dyn MediaStream>) + Send + Sync>;

/// An audio/video track with a mutable enabled flag.
pub trait MediaTrack: Send + Sync {
    fn enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

/// A bundle of media tracks.
pub trait MediaStream: Send + Sync {
    fn audio_tracks(&self) -> Vec<Arc<dyn MediaTrack>>;
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;
}

/// Ordered, reliable, text-capable message channel riding the peer
/// connection.
pub trait DataChannel: Send + Sync {
    /// Send a text frame. Fails when the channel is not open.
    fn send(&self, payload: &str) -> Result<()>;

    fn close(&self);

    fn ready_state(&self) -> DataChannelState;

    /// Install (or clear) the open hook.
    fn set_on_open(&self, hook: Option<Hook>);

    /// Install (or clear) the close hook.
    fn set_on_close(&self, hook: Option<Hook>);

    /// Install (or clear) the error hook.
    fn set_on_error(&self, hook: Option<ErrorHook>);

    /// Install (or clear) the inbound message hook.
    fn set_on_message(&self, hook: Option<MessageHook>);
}

/// Minimum peer-connection surface the realtime client consumes.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    fn add_transceiver(&self, kind: MediaKind, direction: TransceiverDirection) -> Result<()>;

    fn add_track(&self, track: Arc<dyn MediaTrack>, streams: &[Arc<dyn MediaStream>])
    -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    fn close(&self);

    fn connection_state(&self) -> ConnectionState;

    /// Install (or clear) the connection-state hook.
    fn set_on_connection_state_change(&self, hook: Option<StateHook>);

    /// Install (or clear) the remote-track hook.
    fn set_on_track(&self, hook: Option<TrackHook>);
}

/// Injected microphone capture surface.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Capture a microphone stream. Ownership of the returned stream and its
    /// tracks transfers to the caller, which must stop them on teardown.
    async fn capture_microphone(&self) -> Result<Arc<dyn MediaStream>>;
}

/// Injected peer-connection constructor.
pub trait PeerConnectionFactory: Send + Sync {
    fn create_peer_connection(&self) -> Result<Arc<dyn PeerConnection>>;
}
