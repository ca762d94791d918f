//! Wire types for the Ollama-compatible daemon API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;

/// A boxed async stream, used for the streaming chat response.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Fallback context length when the daemon reports none.
pub const DEFAULT_CONTEXT_LENGTH: u64 = 2048;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model descriptors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Metadata for one model served by the upstream daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Full model name (e.g. "qwen3:14b").
    pub name: String,
    pub size_mb: f64,
    /// Model format (e.g. "gguf").
    pub format: String,
    /// Model family (e.g. "qwen3").
    pub family: String,
    /// Human-readable parameter count (e.g. "14.8B").
    pub parameter_size: String,
    /// Quantization level (e.g. "Q4_K_M").
    pub quantization_level: String,
    /// Capability tags (e.g. ["completion", "tools"]).
    pub capabilities: Vec<String>,
    /// Maximum context window in tokens.
    pub context_length: u64,
}

impl ModelInfo {
    pub fn supports_completion(&self) -> bool {
        self.capabilities.iter().any(|c| c == "completion")
    }

    pub fn supports_tools(&self) -> bool {
        self.capabilities.iter().any(|c| c == "tools")
    }

    /// Assemble a descriptor from the daemon's list entry and show response.
    pub(crate) fn from_wire(name: &str, size_bytes: u64, show: &ShowResponse) -> Self {
        let details = &show.details;
        let family = details.family.clone().unwrap_or_else(|| "unknown".into());

        let mut capabilities = show.capabilities.clone();
        if capabilities.is_empty() {
            capabilities.push("completion".into());
        }

        Self {
            name: name.to_string(),
            size_mb: if size_bytes > 0 {
                (size_bytes as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0
            } else {
                0.0
            },
            format: details.format.clone().unwrap_or_else(|| "unknown".into()),
            parameter_size: details
                .parameter_size
                .clone()
                .unwrap_or_else(|| "unknown".into()),
            quantization_level: details
                .quantization_level
                .clone()
                .unwrap_or_else(|| "unknown".into()),
            capabilities,
            context_length: extract_context_length(&show.model_info, &family),
            family,
        }
    }
}

/// Pull the context length out of the daemon's model-info map.
///
/// Prefers the family-qualified key ("qwen3.context_length"), then the
/// bare key, then the conservative default.
pub(crate) fn extract_context_length(model_info: &Map<String, Value>, family: &str) -> u64 {
    let family_key = format!("{family}.context_length");
    model_info
        .get(&family_key)
        .or_else(|| model_info.get("context_length"))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_CONTEXT_LENGTH)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Raw daemon responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagEntry {
    #[serde(alias = "model")]
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShowResponse {
    #[serde(default)]
    pub details: ShowDetails,
    #[serde(default)]
    pub model_info: Map<String, Value>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShowDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One message in the array sent to `/api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    /// Name of the tool a `tool` role message responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into(), tool_calls: None, tool_name: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into(), tool_calls: None, tool_name: None }
    }
    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<WireToolCall>>) -> Self {
        Self { role: "assistant", content: content.into(), tool_calls, tool_name: None }
    }
    pub fn tool(content: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            role: "tool",
            content: content.into(),
            tool_calls: None,
            tool_name: Some(tool_name.into()),
        }
    }
}

/// The daemon's function-wrapped tool call shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Parameters for one streaming chat call.
#[derive(Debug, Clone, Default)]
pub struct ChatStreamRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    /// Tool schemas in the daemon's `{"type":"function",...}` shape.
    pub tools: Vec<Value>,
    pub think: Option<bool>,
    /// Requested context window; passed through verbatim as `options.num_ctx`.
    pub num_ctx: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat chunks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// One decoded record from the streaming chat response.
#[derive(Debug, Clone, Default)]
pub struct ChatChunk {
    /// Content delta; may be empty.
    pub content: String,
    /// Reasoning delta, present when the model was asked to think.
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Terminal flag; token counts are only populated on the last chunk.
    pub done: bool,
    pub eval_count: Option<u64>,
    pub prompt_eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawChunk {
    #[serde(default)]
    pub message: Option<RawChunkMessage>,
    #[serde(default)]
    pub done: bool,
    pub eval_count: Option<u64>,
    pub prompt_eval_count: Option<u64>,
    /// The daemon reports mid-stream failures as `{"error": "..."}`.
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawChunkMessage {
    #[serde(default)]
    pub content: String,
    pub thinking: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

impl From<RawChunk> for ChatChunk {
    fn from(raw: RawChunk) -> Self {
        let message = raw.message.unwrap_or_default();
        ChatChunk {
            content: message.content,
            thinking: message.thinking,
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|tc| ToolCallRequest {
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect(),
            done: raw.done,
            eval_count: raw.eval_count,
            prompt_eval_count: raw.prompt_eval_count,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_length_prefers_family_key() {
        let info: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "qwen3.context_length": 40960,
            "context_length": 8192,
        }))
        .unwrap();
        assert_eq!(extract_context_length(&info, "qwen3"), 40960);
    }

    #[test]
    fn context_length_generic_fallback() {
        let info: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "context_length": 8192,
        }))
        .unwrap();
        assert_eq!(extract_context_length(&info, "llama"), 8192);
    }

    #[test]
    fn context_length_conservative_default() {
        let info = Map::new();
        assert_eq!(extract_context_length(&info, "llama"), DEFAULT_CONTEXT_LENGTH);
    }

    #[test]
    fn chunk_decodes_tool_calls() {
        let raw: RawChunk = serde_json::from_str(
            r#"{"message":{"content":"","tool_calls":[{"function":{"name":"now","arguments":{}}}]},"done":true,"eval_count":12,"prompt_eval_count":40}"#,
        )
        .unwrap();
        let chunk = ChatChunk::from(raw);
        assert!(chunk.done);
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].name, "now");
        assert_eq!(chunk.eval_count, Some(12));
    }

    #[test]
    fn chunk_decodes_content_delta() {
        let raw: RawChunk =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#)
                .unwrap();
        let chunk = ChatChunk::from(raw);
        assert_eq!(chunk.content, "Hel");
        assert!(!chunk.done);
        assert!(chunk.tool_calls.is_empty());
    }

    #[test]
    fn model_info_defaults_to_completion() {
        let show = ShowResponse::default();
        let info = ModelInfo::from_wire("m", 0, &show);
        assert!(info.supports_completion());
        assert_eq!(info.context_length, DEFAULT_CONTEXT_LENGTH);
    }

    #[test]
    fn wire_message_tool_shape() {
        let msg = WireMessage::tool("noon", "now");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_name"], "now");
        assert!(v.get("tool_calls").is_none());
    }
}
