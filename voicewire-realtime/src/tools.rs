//! Tool registry and invocation engine.
//!
//! Looks a tool up by name, parses its streamed arguments, invokes the
//! handler under a timeout with a cancellation signal, and maps every
//! outcome onto the structured output envelope sent back to the model.
//! Handler failures never escape as panics or errors: they become envelopes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::accumulator::{ToolCallLedger, reduce, should_invoke};
use crate::client::RealtimeClient;
use crate::config::ToolDescriptor;
use crate::error::Result;
use crate::events::{ClientEvent, FunctionCallDone, ServerEvent};

/// Default handler timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// An invocable tool.
///
/// Handlers should observe `cancel` to release resources promptly; the
/// engine also races the returned future against its timeout, so a handler
/// that ignores the signal is abandoned, not awaited.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Option<Value>, cancel: CancellationToken) -> anyhow::Result<Value>;
}

type BoxedHandlerFn = Box<
    dyn Fn(Option<Value>, CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>
        + Send
        + Sync,
>;

/// Function-based tool handler.
pub struct FnToolHandler {
    handler: BoxedHandlerFn,
}

impl FnToolHandler {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Option<Value>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self { handler: Box::new(move |input, cancel| Box::pin(handler(input, cancel))) }
    }
}

#[async_trait]
impl ToolHandler for FnToolHandler {
    async fn call(&self, input: Option<Value>, cancel: CancellationToken) -> anyhow::Result<Value> {
        (self.handler)(input, cancel).await
    }
}

/// One registered tool.
pub struct ToolRegistration {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments, when declared.
    pub parameters: Option<Value>,
    /// Whether dispatching this tool triggers a follow-up `response.create`.
    pub auto_response: bool,
    handler: Arc<dyn ToolHandler>,
}

impl ToolRegistration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            auto_response: true,
            handler: Arc::new(handler),
        }
    }

    /// Register with a function handler.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Option<Value>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, description, FnToolHandler::new(handler))
    }

    /// Declare the argument schema.
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    /// Opt out of the automatic follow-up `response.create`.
    pub fn with_auto_response(mut self, auto_response: bool) -> Self {
        self.auto_response = auto_response;
        self
    }

    /// Session-level descriptor for this tool.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            self.name.clone(),
            self.description.clone(),
            self.parameters
                .clone()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        )
    }
}

/// Readonly name → tool map.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolRegistration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Later registrations replace earlier ones of the same name.
    pub fn with_tool(mut self, registration: ToolRegistration) -> Self {
        self.tools.insert(registration.name.clone(), Arc::new(registration));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolRegistration>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors for the session configuration's tool list.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }
}

// ── Output envelope ─────────────────────────────────────────────────────

/// Failure categories reported back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    ToolError,
    ToolTimeout,
}

/// Error half of the output envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputError {
    #[serde(rename = "type")]
    pub kind: ToolErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Envelope metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputMeta {
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(rename = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// The structured output envelope serialized into `function_call_output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolOutputError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ToolOutputMeta>,
}

impl ToolOutput {
    pub fn success(data: Option<Value>, tool_name: Option<&str>) -> Self {
        Self {
            ok: true,
            data,
            error: None,
            meta: tool_name.map(|name| ToolOutputMeta {
                tool_name: Some(name.to_string()),
                timeout_ms: None,
            }),
        }
    }

    pub fn failure(kind: ToolErrorKind, message: impl Into<String>, meta: ToolOutputMeta) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ToolOutputError { kind, message: message.into(), code: None }),
            meta: Some(meta),
        }
    }
}

/// Build the client events that return a tool result to the model: a
/// `conversation.item.create` carrying the JSON-serialized envelope,
/// followed by `response.create` when `auto_response` is set.
pub fn create_function_call_output_events(
    call_id: &str,
    output: &ToolOutput,
    auto_response: bool,
) -> Result<Vec<ClientEvent>> {
    let serialized = serde_json::to_string(output)?;
    let mut item = Map::new();
    item.insert("type".to_string(), Value::String("function_call_output".into()));
    item.insert("call_id".to_string(), Value::String(call_id.to_string()));
    item.insert("output".to_string(), Value::String(serialized));

    let mut events = vec![ClientEvent::conversation_item_create(Value::Object(item))];
    if auto_response {
        events.push(ClientEvent::response_create());
    }
    Ok(events)
}

// ── Invocation engine ───────────────────────────────────────────────────

/// Dispatches done events onto registered handlers.
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, timeout: DEFAULT_TOOL_TIMEOUT }
    }

    /// Override the handler timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke the tool named by a done event and map the outcome onto the
    /// output envelope. Never fails: every outcome is an envelope.
    pub async fn invoke(&self, done: &FunctionCallDone) -> ToolOutput {
        let display_name = done.name.as_deref().unwrap_or("unknown").to_string();

        let Some(tool) = done.name.as_deref().and_then(|name| self.registry.get(name)) else {
            return ToolOutput::failure(
                ToolErrorKind::UnknownTool,
                format!("No tool registered with name \"{display_name}\"."),
                ToolOutputMeta { tool_name: Some(display_name), timeout_ms: None },
            );
        };

        let input = match parse_arguments(&done.arguments) {
            Ok(input) => input,
            Err(_) => {
                return ToolOutput::failure(
                    ToolErrorKind::InvalidArguments,
                    "Tool arguments were not valid JSON.",
                    ToolOutputMeta { tool_name: Some(display_name), timeout_ms: None },
                );
            }
        };

        tracing::debug!(tool = %tool.name, call_id = %done.call_id, "invoking tool");
        let cancel = CancellationToken::new();
        let outcome =
            tokio::time::timeout(self.timeout, tool.handler.call(input, cancel.clone())).await;
        // The handler's signal must fire exactly once, on every path.
        cancel.cancel();

        match outcome {
            Ok(Ok(value)) => ToolOutput::success(Some(value), Some(tool.name.as_str())),
            Ok(Err(e)) => {
                let message = e.to_string();
                let message = if message.trim().is_empty() {
                    "Tool execution failed.".to_string()
                } else {
                    message
                };
                tracing::warn!(tool = %tool.name, error = %message, "tool handler failed");
                ToolOutput::failure(
                    ToolErrorKind::ToolError,
                    message,
                    ToolOutputMeta { tool_name: Some(tool.name.clone()), timeout_ms: None },
                )
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(tool = %tool.name, timeout_ms, "tool handler timed out");
                ToolOutput::failure(
                    ToolErrorKind::ToolTimeout,
                    format!("Tool call \"{}\" timed out after {timeout_ms}ms.", tool.name),
                    ToolOutputMeta {
                        tool_name: Some(tool.name.clone()),
                        timeout_ms: Some(timeout_ms),
                    },
                )
            }
        }
    }
}

/// Parse the accumulated argument text. Blank text means no input.
fn parse_arguments(arguments: &str) -> std::result::Result<Option<Value>, serde_json::Error> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

// ── End-to-end routing ──────────────────────────────────────────────────

/// Drives tool dispatch over a client's event stream.
///
/// Maintains the accumulator ledger, suppresses duplicate done events, and
/// writes each tool's output events back through the client.
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    invoker: ToolInvoker,
}

impl ToolRouter {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        let invoker = ToolInvoker::new(registry.clone());
        Self { registry, invoker }
    }

    /// Override the handler timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.invoker = self.invoker.with_timeout(timeout);
        self
    }

    /// Process events until the session closes.
    pub async fn run(&self, client: &RealtimeClient) -> Result<()> {
        let mut events = client.events();
        let mut ledger = Arc::new(ToolCallLedger::new());
        let epoch = std::time::Instant::now();

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "tool router lagged behind the event stream");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            if let ServerEvent::FunctionCallDone(done) = &event {
                if should_invoke(&ledger, done) {
                    let output = self.invoker.invoke(done).await;
                    let auto_response = done
                        .name
                        .as_deref()
                        .and_then(|name| self.registry.get(name))
                        .map(|tool| tool.auto_response)
                        .unwrap_or(true);
                    for outbound in
                        create_function_call_output_events(&done.call_id, &output, auto_response)?
                    {
                        if let Err(e) = client.send(&outbound) {
                            tracing::warn!(error = %e, "failed to send tool output event");
                        }
                    }
                }
            }

            if matches!(event, ServerEvent::ConnectionClosed) {
                break;
            }
            ledger = reduce(&ledger, &event, epoch.elapsed().as_millis() as u64);
        }
        Ok(())
    }
}
