//! Session configuration types.
//!
//! The session configuration is serialized into the `session` form field of
//! the SDP exchange and forwarded unchanged to the upstream provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Turn-detection policy for input audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    /// Detection kind, e.g. `"semantic_vad"` or `"server_vad"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_response: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt_response: Option<bool>,
}

/// Input-audio session options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputAudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
}

/// Output-audio session options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputAudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Audio session options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputAudioConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputAudioConfig>,
}

/// Session-level function tool descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Per-session policy forwarded to the upstream provider.
///
/// Unknown fields round-trip through `extra`, so callers can pass provider
/// options this crate does not model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session kind; the broker requires `"realtime"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: "realtime".to_string(),
            model: None,
            instructions: None,
            output_modalities: None,
            tool_choice: None,
            audio: None,
            tools: None,
            extra: Map::new(),
        }
    }
}

impl SessionConfig {
    /// Create a new realtime session configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Set output modalities, e.g. `["audio"]`.
    pub fn with_output_modalities(mut self, modalities: Vec<String>) -> Self {
        self.output_modalities = Some(modalities);
        self
    }

    /// Set the tool selection mode.
    pub fn with_tool_choice(mut self, tool_choice: impl Into<String>) -> Self {
        self.tool_choice = Some(tool_choice.into());
        self
    }

    /// Set the output voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        let audio = self.audio.get_or_insert_with(AudioConfig::default);
        audio.output.get_or_insert_with(OutputAudioConfig::default).voice = Some(voice.into());
        self
    }

    /// Set the input turn-detection policy.
    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        let audio = self.audio.get_or_insert_with(AudioConfig::default);
        audio.input.get_or_insert_with(InputAudioConfig::default).turn_detection =
            Some(turn_detection);
        self
    }

    /// Add a tool descriptor.
    pub fn with_tool(mut self, tool: ToolDescriptor) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// Set all tool descriptors at once.
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set a provider-specific passthrough field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
