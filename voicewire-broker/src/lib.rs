//! # voicewire-broker
//!
//! Server-side session broker for the voicewire realtime stack.
//!
//! Browsers cannot hold provider credentials, so they hand their WebRTC SDP
//! offer to this broker as `multipart/form-data` (`sdp` + `session` parts).
//! The broker validates the envelope, forwards the exchange to the upstream
//! realtime-calls endpoint with `Authorization: Bearer` (plus optional
//! organization/project headers), and returns the answer SDP verbatim as
//! `application/sdp`.
//!
//! The broker keeps no per-session state beyond the in-flight HTTP request.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use voicewire_broker::{AppState, BrokerConfig, create_app};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = BrokerConfig::from_env()?;
//! let app = create_app(AppState::new(config));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8787").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod relay;

pub use config::{BrokerConfig, ConfigError, DEFAULT_CALLS_URL, DEFAULT_SESSION_PATH};
pub use relay::{AppState, create_app};
