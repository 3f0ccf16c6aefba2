//! SDP relay routes.
//!
//! Accepts browser-originated multipart SDP offers, validates the envelope,
//! forwards the exchange to the upstream realtime-calls endpoint with
//! credentialed headers, and returns the answer body verbatim. Upstream
//! failures pass through with their original status and body so callers can
//! diagnose them; only broker-side exceptions become 500s.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::BrokerConfig;

const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Generous ceiling for an SDP offer plus session JSON.
const MAX_SESSION_BODY_BYTES: usize = 256 * 1024;

type RelayError = (StatusCode, String);

/// Shared state for the relay routes.
#[derive(Clone)]
pub struct AppState {
    config: Arc<BrokerConfig>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config: Arc::new(config), http: reqwest::Client::new() }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

/// Build the broker router: the configured session path, `/health`, and
/// `/config`, behind CORS and request tracing.
pub fn create_app(state: AppState) -> Router {
    let cors = match state
        .config
        .app_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route(&state.config.session_path, post(relay_session))
        .route("/health", get(health))
        .route("/config", get(config_info))
        .layer(DefaultBodyLimit::max(MAX_SESSION_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "service": "voicewire-broker" }))
}

/// Report the absolute session URL for browser bootstrap, derived from the
/// request's host and forwarded scheme. TLS-terminated deployments keep
/// their `https` scheme through `x-forwarded-proto`.
async fn config_info(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let scheme = match headers.get("x-forwarded-proto").and_then(|value| value.to_str().ok()) {
        Some("https") => "https",
        _ => "http",
    };
    Json(json!({
        "realtimeSessionUrl": format!("{scheme}://{host}{}", state.config.session_path)
    }))
}

async fn relay_session(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match handle_session(state, multipart).await {
        Ok(response) => response,
        Err((status, message)) => (status, message).into_response(),
    }
}

async fn handle_session(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, RelayError> {
    let mut multipart =
        multipart.map_err(|_| bad_request("Expected multipart/form-data request body."))?;

    let mut sdp: Option<String> = None;
    let mut session: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        let text = field
            .text()
            .await
            .map_err(|e| bad_request(format!("Malformed multipart body: {e}")))?;
        match name.as_deref() {
            Some("sdp") => sdp = Some(text),
            Some("session") => session = Some(text),
            _ => {}
        }
    }

    let sdp = sdp.ok_or_else(|| bad_request("Missing sdp form field."))?;
    let session = session.ok_or_else(|| bad_request("Missing session form field."))?;
    if sdp.trim().is_empty() {
        return Err(bad_request("Missing SDP offer in request body."));
    }
    let session_value: Value = serde_json::from_str(&session)
        .map_err(|_| bad_request("Session form field was not valid JSON."))?;
    if session_value.get("type").and_then(Value::as_str) != Some("realtime") {
        return Err(bad_request("Session config must set type \"realtime\"."));
    }

    tracing::debug!(sdp_bytes = sdp.len(), "relaying SDP offer upstream");

    let form = reqwest::multipart::Form::new().text("sdp", sdp).text("session", session);
    let mut request = state
        .http
        .post(state.config.calls_url.clone())
        .bearer_auth(state.config.api_key.expose_secret())
        .multipart(form);
    if let Some(organization) = &state.config.organization {
        request = request.header("OpenAI-Organization", organization);
    }
    if let Some(project) = &state.config.project {
        request = request.header("OpenAI-Project", project);
    }

    let upstream = request.send().await.map_err(|e| {
        tracing::error!(error = %e, "upstream realtime call failed");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Upstream call failed: {e}"))
    })?;

    let status = upstream.status();
    let body = upstream.text().await.map_err(|e| {
        tracing::error!(error = %e, "failed to read upstream response");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Upstream call failed: {e}"))
    })?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "upstream rejected the SDP offer");
        let status =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        return Ok((status, body).into_response());
    }

    tracing::info!(answer_bytes = body.len(), "SDP exchange completed");
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, SDP_CONTENT_TYPE)], body).into_response())
}

fn bad_request(message: impl Into<String>) -> RelayError {
    (StatusCode::BAD_REQUEST, message.into())
}
