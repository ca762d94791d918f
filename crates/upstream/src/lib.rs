//! Client for the Ollama-compatible inference daemon.
//!
//! Exposes the [`ChatBackend`] trait (the seam the orchestrator is tested
//! against) and [`OllamaClient`], the production implementation over the
//! daemon's native HTTP API.

mod client;
mod ndjson;
pub mod types;

pub use client::{ChatBackend, OllamaClient};
pub use types::{
    BoxStream, ChatChunk, ChatStreamRequest, ModelInfo, ToolCallRequest, WireFunction,
    WireMessage, WireToolCall, DEFAULT_CONTEXT_LENGTH,
};
