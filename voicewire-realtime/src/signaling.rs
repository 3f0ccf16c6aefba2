//! Session-endpoint SDP signaling.
//!
//! The client never talks to the upstream provider directly: it hands its
//! local offer to the session broker, which signs the exchange with the
//! server-held API key and returns the raw answer SDP.

use async_trait::async_trait;
use url::Url;

use crate::error::{RealtimeError, Result};

/// Brokered SDP exchange.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Exchange a local offer for the remote answer SDP.
    ///
    /// `session_json` is the JSON-serialized session configuration forwarded
    /// unchanged to the upstream provider.
    async fn exchange_offer(&self, offer_sdp: &str, session_json: &str) -> Result<String>;
}

/// HTTP signaling client posting to the session broker.
///
/// Sends a multipart form with parts `sdp` (raw offer text) and `session`
/// (JSON configuration); the 2xx response body is the answer SDP verbatim.
pub struct HttpSignalingClient {
    http: reqwest::Client,
    session_url: Url,
}

impl HttpSignalingClient {
    pub fn new(session_url: Url) -> Self {
        Self { http: reqwest::Client::new(), session_url }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(http: reqwest::Client, session_url: Url) -> Self {
        Self { http, session_url }
    }
}

#[async_trait]
impl SignalingClient for HttpSignalingClient {
    async fn exchange_offer(&self, offer_sdp: &str, session_json: &str) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .text("sdp", offer_sdp.to_string())
            .text("session", session_json.to_string());

        let response = self
            .http
            .post(self.session_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| RealtimeError::signaling(format!("Session setup failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RealtimeError::signaling(format!("Session setup failed: {e}")))?;

        if !status.is_success() {
            return Err(RealtimeError::signaling(format!(
                "Session setup failed with status {status}: {body}"
            )));
        }
        if body.trim().is_empty() {
            return Err(RealtimeError::signaling("Session setup returned empty SDP."));
        }
        Ok(body)
    }
}
