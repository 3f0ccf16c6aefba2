//! Realtime transport client.
//!
//! Owns the session lifecycle: peer connection, data channel, microphone
//! capture, SDP exchange through the session broker, playback queue, and the
//! demultiplexing of the inbound event stream into per-call argument
//! streams.
//!
//! The client never shares its transport resources. Everything observable
//! crosses the boundary through the event stream, the tool-call start
//! stream, and the send surface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, broadcast, mpsc};

use crate::accumulator::UNKNOWN_RESPONSE_ID;
use crate::audio::{AudioSink, PlaybackQueue};
use crate::config::SessionConfig;
use crate::error::{RealtimeError, Result};
use crate::events::{self, ClientEvent, FunctionCallDelta, ServerEvent};
use crate::signaling::SignalingClient;
use crate::transport::{
    ConnectionState, DataChannel, DataChannelState, MediaDevices, MediaKind, MediaStream,
    MediaTrack, PeerConnection, PeerConnectionFactory, SessionDescription, TransceiverDirection,
};

/// Default label for the event data channel.
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "oai-events";

const SEND_BEFORE_OPEN: &str = "Cannot send before data channel is open.";

/// Top-level client lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Idle,
    Connecting,
    Connected,
    Closing,
}

/// One newly observed tool call.
///
/// `argument_chunks` is a fresh, single-consumer stream of argument
/// fragments for this call, in receipt order. It completes when the matching
/// done event arrives or the transport tears down.
pub struct ToolCallStart {
    pub call_id: String,
    pub item_id: String,
    pub response_id: String,
    pub argument_chunks: mpsc::UnboundedReceiver<String>,
}

struct Microphone {
    stream: Arc<dyn MediaStream>,
    track: Arc<dyn MediaTrack>,
}

struct Connection {
    peer: Arc<dyn PeerConnection>,
    channel: Arc<dyn DataChannel>,
    microphone: Option<Microphone>,
}

struct ClientInner {
    factory: Arc<dyn PeerConnectionFactory>,
    media_devices: Arc<dyn MediaDevices>,
    signaling: Arc<dyn SignalingClient>,
    session_config: SessionConfig,
    data_channel_label: String,
    audio_sink: Option<Arc<dyn AudioSink>>,

    status: Mutex<ClientStatus>,
    conn: Mutex<Option<Connection>>,
    playback: Mutex<Option<PlaybackQueue>>,

    // Per-call arena, cleared on every teardown.
    call_streams: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    call_names: Mutex<HashMap<String, String>>,
    completed_calls: Mutex<HashSet<String>>,

    events_tx: broadcast::Sender<ServerEvent>,
    starts_tx: Mutex<Option<mpsc::UnboundedSender<ToolCallStart>>>,
    remote_audio_tx: broadcast::Sender<Arc<dyn MediaStream>>,
}

/// Builder for [`RealtimeClient`].
pub struct RealtimeClientBuilder {
    factory: Arc<dyn PeerConnectionFactory>,
    media_devices: Arc<dyn MediaDevices>,
    signaling: Arc<dyn SignalingClient>,
    session_config: SessionConfig,
    data_channel_label: String,
    audio_sink: Option<Arc<dyn AudioSink>>,
    events_capacity: usize,
}

impl RealtimeClientBuilder {
    /// Start a builder from the injected platform surfaces.
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        media_devices: Arc<dyn MediaDevices>,
        signaling: Arc<dyn SignalingClient>,
    ) -> Self {
        Self {
            factory,
            media_devices,
            signaling,
            session_config: SessionConfig::default(),
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            audio_sink: None,
            events_capacity: 256,
        }
    }

    /// Set the session configuration sent during the SDP exchange.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Override the data channel label.
    pub fn data_channel_label(mut self, label: impl Into<String>) -> Self {
        self.data_channel_label = label.into();
        self
    }

    /// Attach a playback sink for remote audio delta events.
    pub fn audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    /// Capacity of the broadcast event stream.
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> RealtimeClient {
        let (events_tx, _) = broadcast::channel(self.events_capacity);
        let (remote_audio_tx, _) = broadcast::channel(8);
        RealtimeClient {
            inner: Arc::new(ClientInner {
                factory: self.factory,
                media_devices: self.media_devices,
                signaling: self.signaling,
                session_config: self.session_config,
                data_channel_label: self.data_channel_label,
                audio_sink: self.audio_sink,
                status: Mutex::new(ClientStatus::Idle),
                conn: Mutex::new(None),
                playback: Mutex::new(None),
                call_streams: Mutex::new(HashMap::new()),
                call_names: Mutex::new(HashMap::new()),
                completed_calls: Mutex::new(HashSet::new()),
                events_tx,
                starts_tx: Mutex::new(None),
                remote_audio_tx,
            }),
        }
    }
}

/// Realtime session client.
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl RealtimeClient {
    /// Builder entry point.
    pub fn builder(
        factory: Arc<dyn PeerConnectionFactory>,
        media_devices: Arc<dyn MediaDevices>,
        signaling: Arc<dyn SignalingClient>,
    ) -> RealtimeClientBuilder {
        RealtimeClientBuilder::new(factory, media_devices, signaling)
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ClientStatus {
        *self.inner.status.lock()
    }

    /// Whether a session is currently connected.
    pub fn is_connected(&self) -> bool {
        self.status() == ClientStatus::Connected
    }

    /// Subscribe to the event stream.
    ///
    /// Every parsed server event plus the synthetic lifecycle events, in
    /// receipt order. Late subscribers miss prior events.
    pub fn events(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Subscribe to tool-call starts: one emission per newly observed
    /// `call_id`, carrying that call's fresh argument-chunk stream.
    ///
    /// A subsequent call replaces the previous subscription; there is one
    /// live consumer at a time.
    pub fn tool_call_starts(&self) -> mpsc::UnboundedReceiver<ToolCallStart> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.starts_tx.lock() = Some(tx);
        rx
    }

    /// Subscribe to remote audio media streams extracted from track events.
    pub fn remote_audio_streams(&self) -> broadcast::Receiver<Arc<dyn MediaStream>> {
        self.inner.remote_audio_tx.subscribe()
    }

    /// Establish a session.
    ///
    /// Idempotent: a no-op when the client is already connecting or
    /// connected. On failure a synthetic error event is published and the
    /// client returns to idle.
    pub async fn connect(&self) -> Result<()> {
        ClientInner::connect(&self.inner).await
    }

    /// Tear the session down, completing all per-call streams and releasing
    /// transport and microphone resources.
    pub fn disconnect(&self) {
        self.inner.teardown();
    }

    /// Send a client event on the data channel.
    ///
    /// Synchronous and unbuffered: fails fast (and publishes a local error
    /// event) when the data channel is not open.
    pub fn send(&self, event: &ClientEvent) -> Result<()> {
        self.inner.send(event)
    }

    /// Toggle the microphone track, capturing one lazily on first enable.
    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<()> {
        ClientInner::set_microphone_enabled(&self.inner, enabled).await
    }
}

impl ClientInner {
    async fn connect(inner: &Arc<Self>) -> Result<()> {
        {
            let mut status = inner.status.lock();
            if *status != ClientStatus::Idle {
                return Ok(());
            }
            *status = ClientStatus::Connecting;
        }

        match Self::establish(inner).await {
            Ok(()) => {
                {
                    let mut status = inner.status.lock();
                    if *status != ClientStatus::Connecting {
                        return Err(RealtimeError::connection("Session closed during setup."));
                    }
                    *status = ClientStatus::Connected;
                }
                tracing::info!("realtime session connected");
                inner.publish(ServerEvent::ConnectionOpen);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "realtime session setup failed");
                inner.publish(ServerEvent::local_error("connection_error", e.to_string()));
                inner.teardown();
                Err(e)
            }
        }
    }

    async fn establish(inner: &Arc<Self>) -> Result<()> {
        let peer = inner.factory.create_peer_connection()?;
        peer.add_transceiver(MediaKind::Audio, TransceiverDirection::RecvOnly)?;

        {
            let remote_audio_tx = inner.remote_audio_tx.clone();
            peer.set_on_track(Some(Box::new(move |stream| {
                let _ = remote_audio_tx.send(stream);
            })));
        }

        // Microphone capture is best-effort: without one the SDP still
        // advertises audio through the recvonly transceiver.
        let microphone = match inner.media_devices.capture_microphone().await {
            Ok(stream) => match stream.audio_tracks().into_iter().next() {
                Some(track) => {
                    peer.add_track(track.clone(), &[stream.clone()])?;
                    Some(Microphone { stream, track })
                }
                None => {
                    inner.publish(ServerEvent::local_error(
                        "microphone_error",
                        "Microphone stream carried no audio track.",
                    ));
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "microphone capture failed");
                inner.publish(ServerEvent::local_error(
                    "microphone_error",
                    format!("Microphone capture failed: {e}"),
                ));
                None
            }
        };

        let channel = peer.create_data_channel(&inner.data_channel_label)?;
        let opened = Arc::new(Notify::new());
        {
            let opened = opened.clone();
            channel.set_on_open(Some(Box::new(move || opened.notify_one())));
        }
        {
            let weak = Arc::downgrade(inner);
            channel.set_on_message(Some(Box::new(move |payload| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_message(&payload);
                }
            })));
        }
        {
            let weak = Arc::downgrade(inner);
            channel.set_on_error(Some(Box::new(move |message| {
                if let Some(inner) = weak.upgrade() {
                    inner.publish(ServerEvent::local_error(
                        "transport_error",
                        format!("Transport error: {message}"),
                    ));
                }
            })));
        }
        {
            let weak = Arc::downgrade(inner);
            let opened = opened.clone();
            channel.set_on_close(Some(Box::new(move || {
                opened.notify_one();
                if let Some(inner) = weak.upgrade() {
                    inner.teardown();
                }
            })));
        }
        {
            let weak = Arc::downgrade(inner);
            peer.set_on_connection_state_change(Some(Box::new(move |state| {
                if matches!(state, ConnectionState::Closed | ConnectionState::Disconnected) {
                    if let Some(inner) = weak.upgrade() {
                        inner.teardown();
                    }
                }
            })));
        }

        // Resources are registered before the first await so a concurrent
        // disconnect can cancel the setup.
        *inner.conn.lock() = Some(Connection {
            peer: peer.clone(),
            channel: channel.clone(),
            microphone,
        });
        if let Some(sink) = &inner.audio_sink {
            *inner.playback.lock() =
                Some(PlaybackQueue::new(sink.clone(), inner.events_tx.clone()));
        }

        let offer = peer.create_offer().await?;
        if offer.sdp.trim().is_empty() {
            return Err(RealtimeError::connection("Peer offer did not include SDP."));
        }
        peer.set_local_description(offer.clone()).await?;

        let session_json = serde_json::to_string(&inner.session_config)?;
        let answer_sdp = inner.signaling.exchange_offer(&offer.sdp, &session_json).await?;
        peer.set_remote_description(SessionDescription::answer(answer_sdp)).await?;

        if channel.ready_state() != DataChannelState::Open {
            opened.notified().await;
        }
        if channel.ready_state() != DataChannelState::Open {
            return Err(RealtimeError::connection(
                "Session setup failed: data channel did not open.",
            ));
        }
        Ok(())
    }

    fn send(&self, event: &ClientEvent) -> Result<()> {
        if let Err(e) = events::parse_client_event(&event.to_value()) {
            self.publish(ServerEvent::local_error("invalid_payload", e.to_string()));
            return Err(e);
        }
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                self.publish(ServerEvent::local_error(
                    "invalid_payload",
                    "Client payload is not JSON serializable.",
                ));
                return Err(e);
            }
        };

        let channel = self.conn.lock().as_ref().map(|c| c.channel.clone());
        match channel {
            Some(channel) if channel.ready_state() == DataChannelState::Open => {
                tracing::debug!(event_type = %event.event_type(), "sending client event");
                channel.send(&payload)
            }
            _ => {
                self.publish(ServerEvent::local_error("send_error", SEND_BEFORE_OPEN));
                Err(RealtimeError::transport(SEND_BEFORE_OPEN))
            }
        }
    }

    async fn set_microphone_enabled(inner: &Arc<Self>, enabled: bool) -> Result<()> {
        let connected = {
            let conn = inner.conn.lock();
            conn.as_ref().map(|c| c.microphone.as_ref().map(|m| m.track.clone()))
        };
        let Some(existing) = connected else {
            let message = "Cannot toggle microphone before a connection exists.";
            inner.publish(ServerEvent::local_error("microphone_error", message));
            return Err(RealtimeError::transport(message));
        };

        match existing {
            Some(track) => {
                track.set_enabled(enabled);
                Ok(())
            }
            None if enabled => {
                let stream = match inner.media_devices.capture_microphone().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        inner.publish(ServerEvent::local_error(
                            "microphone_error",
                            format!("Microphone capture failed: {e}"),
                        ));
                        return Err(e);
                    }
                };
                let Some(track) = stream.audio_tracks().into_iter().next() else {
                    let message = "Microphone stream carried no audio track.";
                    inner.publish(ServerEvent::local_error("microphone_error", message));
                    return Err(RealtimeError::audio(message));
                };
                track.set_enabled(true);

                let mut conn = inner.conn.lock();
                match conn.as_mut() {
                    Some(c) => {
                        c.peer.add_track(track.clone(), &[stream.clone()])?;
                        c.microphone = Some(Microphone { stream, track });
                        Ok(())
                    }
                    // The session tore down while capture was in flight.
                    None => {
                        track.stop();
                        for t in stream.tracks() {
                            t.stop();
                        }
                        Err(RealtimeError::transport("Connection closed during microphone capture."))
                    }
                }
            }
            None => Ok(()),
        }
    }

    /// Demultiplex one inbound data-channel frame.
    fn handle_message(&self, payload: &str) {
        let raw: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(_) => {
                self.publish(ServerEvent::local_error(
                    "invalid_payload",
                    "Transport payload was not valid JSON.",
                ));
                return;
            }
        };
        if !raw.is_object() {
            self.publish(ServerEvent::local_error(
                "invalid_payload",
                "Transport payload was not a JSON object.",
            ));
            return;
        }

        // Record tool names announced ahead of the done event.
        if let Some(added) = events::function_call_item_added(&raw) {
            self.call_names.lock().insert(added.call_id, added.name);
        }

        let mut event = match events::parse_server_event(&raw) {
            Ok(event) => event,
            Err(e) => {
                self.publish(ServerEvent::local_error("invalid_envelope", e.to_string()));
                return;
            }
        };

        match &mut event {
            ServerEvent::FunctionCallDelta(delta) => {
                self.dispatch_delta(delta);
            }
            ServerEvent::FunctionCallDone(done) => {
                // An explicit name on the done event wins over the cached one.
                if done.name.is_none() {
                    if let Some(name) = self.call_names.lock().get(&done.call_id) {
                        done.name = Some(name.clone());
                    }
                }
                // Dropping the sender completes the per-call stream. The
                // call id is remembered so a delta straggling in after the
                // done event cannot resurrect the stream.
                self.completed_calls.lock().insert(done.call_id.clone());
                self.call_streams.lock().remove(&done.call_id);
                self.call_names.lock().remove(&done.call_id);
            }
            ServerEvent::AudioDelta(chunk) => {
                if let Some(playback) = self.playback.lock().as_ref() {
                    playback.enqueue(chunk);
                }
            }
            _ => {}
        }

        self.publish(event);
    }

    fn dispatch_delta(&self, delta: &FunctionCallDelta) {
        // The per-call stream completed with the done event; a late delta
        // still appears on the event stream (and keeps appending in the
        // accumulator) but must not open a second stream for the call.
        if self.completed_calls.lock().contains(&delta.call_id) {
            tracing::debug!(call_id = %delta.call_id, "dropping delta for completed call");
            return;
        }
        let (sender, start) = {
            let mut streams = self.call_streams.lock();
            if let Some(sender) = streams.get(&delta.call_id) {
                (sender.clone(), None)
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                streams.insert(delta.call_id.clone(), tx.clone());
                let start = ToolCallStart {
                    call_id: delta.call_id.clone(),
                    item_id: delta.item_id.clone().unwrap_or_else(|| delta.call_id.clone()),
                    response_id: delta
                        .response_id
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_RESPONSE_ID.to_string()),
                    argument_chunks: rx,
                };
                (tx, Some(start))
            }
        };
        // The start must reach consumers before the first chunk.
        if let Some(start) = start {
            if let Some(starts) = self.starts_tx.lock().as_ref() {
                let _ = starts.send(start);
            }
        }
        let _ = sender.send(delta.delta.clone());
    }

    fn publish(&self, event: ServerEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Single teardown path shared by `disconnect()` and unsolicited
    /// transport closure. Safe against re-entry from transport hooks.
    fn teardown(&self) {
        let was = {
            let mut status = self.status.lock();
            if *status == ClientStatus::Idle {
                return;
            }
            let was = *status;
            *status = ClientStatus::Closing;
            was
        };

        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.channel.set_on_open(None);
            conn.channel.set_on_close(None);
            conn.channel.set_on_error(None);
            conn.channel.set_on_message(None);
            conn.peer.set_on_connection_state_change(None);
            conn.peer.set_on_track(None);
            conn.channel.close();
            conn.peer.close();
            if let Some(microphone) = conn.microphone {
                microphone.track.stop();
                // Stopping only the captured track leaves the platform mic
                // indicator lit; every track on the stream must stop.
                for track in microphone.stream.tracks() {
                    track.stop();
                }
            }
        }

        *self.playback.lock() = None;
        self.call_streams.lock().clear();
        self.call_names.lock().clear();
        self.completed_calls.lock().clear();

        *self.status.lock() = ClientStatus::Idle;
        if was == ClientStatus::Connected {
            tracing::info!("realtime session closed");
            self.publish(ServerEvent::ConnectionClosed);
        }
    }
}
