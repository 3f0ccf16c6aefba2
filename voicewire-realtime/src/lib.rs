//! # voicewire-realtime
//!
//! Realtime, tool-calling voice agent client. Mediates between an embedding
//! application and a hosted speech-to-speech model: negotiates a WebRTC
//! session through a server-brokered SDP exchange, demultiplexes the model
//! event stream into per-tool-call argument streams, and dispatches tool
//! handlers whose structured outputs flow back to the model over the data
//! channel.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────┐   offer/answer    ┌────────────────┐   credentials   ┌──────────┐
//!   │ RealtimeClient│ ────────────────▶ │ session broker │ ──────────────▶ │ upstream │
//!   │  (this crate) │ ◀──────────────── │ (voicewire-    │ ◀────────────── │ provider │
//!   └──────┬────────┘     answer SDP    │     broker)    │                 └──────────┘
//!          │ data channel (JSON events) └────────────────┘
//!          ▼
//!   events ── tool-call starts ── per-call argument chunks ── remote audio
//! ```
//!
//! The transport is consumed through the abstract contracts in
//! [`transport`]; platform WebRTC APIs (or test doubles) are injected at
//! construction time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voicewire_realtime::{
//!     HttpSignalingClient, RealtimeClient, SessionConfig, ToolRegistration,
//!     ToolRegistry, ToolRouter,
//! };
//!
//! let registry = Arc::new(ToolRegistry::new().with_tool(ToolRegistration::from_fn(
//!     "get_weather",
//!     "Get the weather for a city",
//!     |input, _cancel| async move { Ok(serde_json::json!({ "forecast": "sunny" })) },
//! )));
//!
//! let config = SessionConfig::new()
//!     .with_model("gpt-realtime")
//!     .with_voice("marin")
//!     .with_tools(registry.descriptors());
//!
//! let client = RealtimeClient::builder(factory, media_devices, signaling)
//!     .session_config(config)
//!     .build();
//!
//! client.connect().await?;
//! ToolRouter::new(registry).run(&client).await?;
//! ```

pub mod accumulator;
pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod signaling;
pub mod tools;
pub mod transport;

// Re-exports
pub use accumulator::{ToolCallEntry, ToolCallLedger, UNKNOWN_RESPONSE_ID, reduce, should_invoke};
pub use audio::{AudioSink, PlaybackQueue, decode_pcm16_base64, downsample, encode_pcm16_base64};
pub use client::{
    ClientStatus, DEFAULT_DATA_CHANNEL_LABEL, RealtimeClient, RealtimeClientBuilder, ToolCallStart,
};
pub use config::{SessionConfig, ToolDescriptor, TurnDetection};
pub use error::{RealtimeError, Result};
pub use events::{
    ClientEvent, ErrorInfo, FunctionCallDelta, FunctionCallDone, ServerEvent, parse_client_event,
    parse_server_event,
};
pub use signaling::{HttpSignalingClient, SignalingClient};
pub use tools::{
    FnToolHandler, ToolHandler, ToolInvoker, ToolOutput, ToolRegistration, ToolRegistry,
    ToolRouter, create_function_call_output_events,
};
pub use transport::{
    ConnectionState, DataChannel, DataChannelState, MediaDevices, MediaStream, MediaTrack,
    PeerConnection, PeerConnectionFactory, SessionDescription,
};
