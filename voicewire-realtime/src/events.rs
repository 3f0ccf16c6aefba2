//! Event protocol codec.
//!
//! Validates and shapes untyped JSON into a tagged union of server events,
//! and wraps outbound client events in a validated envelope. The upstream
//! protocol surfaces the same logical tool invocation under several event
//! types (`response.function_call_arguments.delta`/`.done` and
//! `response.output_item.added`/`.done` with a nested function-call item);
//! this module normalizes all of them onto one canonical done shape so the
//! rest of the stack joins on `call_id` alone.
//!
//! Parse failures never panic: callers receive an error they can convert to
//! a synthetic error event on the local stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RealtimeError, Result};

/// Rejection message for inbound payloads that are not event envelopes.
pub const SERVER_ENVELOPE_ERROR: &str = "Server payload is not a valid event envelope.";

/// Rejection message for outbound payloads that are not event envelopes.
pub const CLIENT_ENVELOPE_ERROR: &str = "Client payload is not a valid event envelope.";

// ── Wire type identifiers ───────────────────────────────────────────────

pub const TYPE_FUNCTION_CALL_ARGUMENTS_DELTA: &str = "response.function_call_arguments.delta";
pub const TYPE_FUNCTION_CALL_ARGUMENTS_DONE: &str = "response.function_call_arguments.done";
pub const TYPE_OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
pub const TYPE_OUTPUT_ITEM_DONE: &str = "response.output_item.done";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_AUDIO_DELTA: &str = "response.audio.delta";

/// Synthetic local event published when the data channel opens.
pub const TYPE_CONNECTION_OPEN: &str = "runtime.connection.open";
/// Synthetic local event published when the transport tears down.
pub const TYPE_CONNECTION_CLOSED: &str = "runtime.connection.closed";

pub const TYPE_CONVERSATION_ITEM_CREATE: &str = "conversation.item.create";
pub const TYPE_RESPONSE_CREATE: &str = "response.create";
pub const TYPE_SESSION_UPDATE: &str = "session.update";

// ── Server events ───────────────────────────────────────────────────────

/// One fragment of JSON-encoded tool arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Call this fragment belongs to.
    pub call_id: String,
    /// Argument text fragment.
    pub delta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Terminal event for one tool call, carrying the full argument text.
///
/// This is the canonical shape: `response.output_item.done` events with a
/// nested function-call item are normalized into it at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDone {
    /// Call being completed.
    pub call_id: String,
    /// Complete JSON-encoded argument text.
    pub arguments: String,
    /// Tool name, when the upstream supplied it on this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Error details reported by the server or synthesized locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type/code.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// An `error` event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: ErrorInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// One chunk of base64-encoded PCM16 output audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDelta {
    /// Base64-encoded little-endian PCM16 samples.
    pub delta: String,
    /// Sample rate of the chunk; 24000 when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl AudioDelta {
    /// Effective sample rate for this chunk.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate_hz.unwrap_or(crate::audio::DEFAULT_OUTPUT_SAMPLE_RATE_HZ)
    }
}

/// Parsed server event.
///
/// Unknown envelopes pass through as [`ServerEvent::Other`] with every field
/// preserved, so the event stream stays lossless for forward compatibility.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `response.function_call_arguments.delta`
    FunctionCallDelta(FunctionCallDelta),
    /// `response.function_call_arguments.done` (or a normalized
    /// `response.output_item.done` function-call item).
    FunctionCallDone(FunctionCallDone),
    /// `error`
    Error(ErrorEvent),
    /// `response.audio.delta`
    AudioDelta(AudioDelta),
    /// Synthetic `runtime.connection.open`.
    ConnectionOpen,
    /// Synthetic `runtime.connection.closed`.
    ConnectionClosed,
    /// Any other envelope, passed through untouched.
    Other(Map<String, Value>),
}

impl ServerEvent {
    /// Wire `type` of this event.
    pub fn event_type(&self) -> &str {
        match self {
            Self::FunctionCallDelta(_) => TYPE_FUNCTION_CALL_ARGUMENTS_DELTA,
            Self::FunctionCallDone(_) => TYPE_FUNCTION_CALL_ARGUMENTS_DONE,
            Self::Error(_) => TYPE_ERROR,
            Self::AudioDelta(_) => TYPE_AUDIO_DELTA,
            Self::ConnectionOpen => TYPE_CONNECTION_OPEN,
            Self::ConnectionClosed => TYPE_CONNECTION_CLOSED,
            Self::Other(fields) => {
                fields.get("type").and_then(Value::as_str).unwrap_or_default()
            }
        }
    }

    /// Whether this is a `response.function_call_arguments.delta` event.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::FunctionCallDelta(_))
    }

    /// Whether this is a canonical done event.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::FunctionCallDone(_))
    }

    /// Whether this is an `error` event.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Build a locally synthesized error event.
    pub fn local_error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorEvent {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
                code: None,
                param: None,
            },
            event_id: None,
        })
    }

    /// Re-serialize this event to its wire envelope.
    ///
    /// Normalization is idempotent: parsing the produced value yields an
    /// event equal to `self`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::FunctionCallDelta(delta) => tagged(TYPE_FUNCTION_CALL_ARGUMENTS_DELTA, delta),
            Self::FunctionCallDone(done) => tagged(TYPE_FUNCTION_CALL_ARGUMENTS_DONE, done),
            Self::Error(error) => tagged(TYPE_ERROR, error),
            Self::AudioDelta(audio) => tagged(TYPE_AUDIO_DELTA, audio),
            Self::ConnectionOpen => tagged(TYPE_CONNECTION_OPEN, &Map::new()),
            Self::ConnectionClosed => tagged(TYPE_CONNECTION_CLOSED, &Map::new()),
            Self::Other(fields) => Value::Object(fields.clone()),
        }
    }
}

fn tagged<T: Serialize>(event_type: &str, body: &T) -> Value {
    let mut value = serde_json::to_value(body).unwrap_or(Value::Object(Map::new()));
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), Value::String(event_type.to_string()));
    }
    value
}

/// Parse an inbound payload into a [`ServerEvent`].
///
/// Attempts, in order: delta schema, done schema, `output_item.done`
/// function-call normalization, error schema, audio-delta schema, synthetic
/// lifecycle types, then open-envelope passthrough. A known `type` whose
/// payload fails its schema falls through to passthrough rather than being
/// rejected; only a non-object payload or a missing/empty `type` rejects.
pub fn parse_server_event(raw: &Value) -> Result<ServerEvent> {
    let fields = raw.as_object().ok_or_else(|| RealtimeError::envelope(SERVER_ENVELOPE_ERROR))?;
    let event_type = fields
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RealtimeError::envelope(SERVER_ENVELOPE_ERROR))?;

    match event_type {
        TYPE_FUNCTION_CALL_ARGUMENTS_DELTA => {
            if let Ok(delta) = serde_json::from_value::<FunctionCallDelta>(raw.clone()) {
                return Ok(ServerEvent::FunctionCallDelta(delta));
            }
        }
        TYPE_FUNCTION_CALL_ARGUMENTS_DONE => {
            if let Ok(done) = serde_json::from_value::<FunctionCallDone>(raw.clone()) {
                return Ok(ServerEvent::FunctionCallDone(done));
            }
        }
        TYPE_OUTPUT_ITEM_DONE => {
            if let Some(done) = normalize_output_item_done(fields) {
                return Ok(ServerEvent::FunctionCallDone(done));
            }
        }
        TYPE_ERROR => {
            if let Ok(error) = serde_json::from_value::<ErrorEvent>(raw.clone()) {
                return Ok(ServerEvent::Error(error));
            }
        }
        TYPE_AUDIO_DELTA => {
            if let Ok(audio) = serde_json::from_value::<AudioDelta>(raw.clone()) {
                return Ok(ServerEvent::AudioDelta(audio));
            }
        }
        TYPE_CONNECTION_OPEN => return Ok(ServerEvent::ConnectionOpen),
        TYPE_CONNECTION_CLOSED => return Ok(ServerEvent::ConnectionClosed),
        _ => {}
    }

    Ok(ServerEvent::Other(fields.clone()))
}

/// Normalize a `response.output_item.done` function-call item into the
/// canonical done shape: `item.arguments` → `arguments`, `item.call_id` →
/// `call_id`, `item.id` → `item_id`, `item.name` → `name`, with the
/// top-level `output_index`/`response_id`/`event_id` carried over.
fn normalize_output_item_done(fields: &Map<String, Value>) -> Option<FunctionCallDone> {
    let item = fields.get("item")?.as_object()?;
    if item.get("type").and_then(Value::as_str) != Some("function_call") {
        return None;
    }
    Some(FunctionCallDone {
        call_id: item.get("call_id")?.as_str()?.to_string(),
        arguments: item.get("arguments")?.as_str()?.to_string(),
        name: item.get("name").and_then(Value::as_str).map(str::to_string),
        item_id: item.get("id").and_then(Value::as_str).map(str::to_string),
        output_index: fields.get("output_index").and_then(Value::as_u64).map(|v| v as u32),
        response_id: fields.get("response_id").and_then(Value::as_str).map(str::to_string),
        event_id: fields.get("event_id").and_then(Value::as_str).map(str::to_string),
    })
}

/// Tool-call metadata carried by a `response.output_item.added` event.
///
/// Not an event variant of its own: the added event passes through as
/// [`ServerEvent::Other`], but the `(call_id, name)` pair it carries is the
/// only place some upstreams name the tool before the done event.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallItemAdded {
    pub call_id: String,
    pub name: String,
    pub item_id: Option<String>,
}

/// Extract function-call metadata from a raw `response.output_item.added`
/// payload, if it carries one.
pub fn function_call_item_added(raw: &Value) -> Option<FunctionCallItemAdded> {
    let fields = raw.as_object()?;
    if fields.get("type").and_then(Value::as_str) != Some(TYPE_OUTPUT_ITEM_ADDED) {
        return None;
    }
    let item = fields.get("item")?.as_object()?;
    if item.get("type").and_then(Value::as_str) != Some("function_call") {
        return None;
    }
    Some(FunctionCallItemAdded {
        call_id: item.get("call_id")?.as_str()?.to_string(),
        name: item.get("name")?.as_str()?.to_string(),
        item_id: item.get("id").and_then(Value::as_str).map(str::to_string),
    })
}

// ── Client events ───────────────────────────────────────────────────────

/// A validated outbound event envelope.
///
/// Client events are open maps with a required non-empty string `type`;
/// everything else passes through to the wire untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    fields: Map<String, Value>,
}

impl ClientEvent {
    /// Build a `conversation.item.create` event.
    pub fn conversation_item_create(item: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(TYPE_CONVERSATION_ITEM_CREATE.into()));
        fields.insert("item".to_string(), item);
        Self { fields }
    }

    /// Build a `response.create` event with an empty response object.
    pub fn response_create() -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(TYPE_RESPONSE_CREATE.into()));
        fields.insert("response".to_string(), Value::Object(Map::new()));
        Self { fields }
    }

    /// Build a `session.update` event.
    pub fn session_update(session: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(TYPE_SESSION_UPDATE.into()));
        fields.insert("session".to_string(), session);
        Self { fields }
    }

    /// Wire `type` of this event.
    pub fn event_type(&self) -> &str {
        self.fields.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    /// Access a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The wire envelope for this event.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Serialize to the JSON text frame sent on the data channel.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }
}

/// Validate an outbound payload as a [`ClientEvent`].
///
/// Requires a JSON object with a non-empty string `type`; rejects anything
/// else with [`CLIENT_ENVELOPE_ERROR`].
pub fn parse_client_event(raw: &Value) -> Result<ClientEvent> {
    let fields = raw.as_object().ok_or_else(|| RealtimeError::envelope(CLIENT_ENVELOPE_ERROR))?;
    fields
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RealtimeError::envelope(CLIENT_ENVELOPE_ERROR))?;
    Ok(ClientEvent { fields: fields.clone() })
}
