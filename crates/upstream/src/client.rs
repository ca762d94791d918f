//! Async client for the Ollama-compatible daemon API.
//!
//! Thin and capability-preserving: every operation maps to one daemon
//! endpoint, transport failures and daemon-reported errors surface as
//! distinct error kinds, and nothing is retried silently.

use async_trait::async_trait;
use serde_json::Value;

use mochi_domain::error::{Error, Result};

use crate::ndjson::drain_lines;
use crate::types::{
    BoxStream, ChatChunk, ChatStreamRequest, ModelInfo, RawChunk, ShowResponse, TagsResponse,
    WireMessage,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The inference daemon seam.
///
/// The orchestrator and the API layer only see this trait; tests script it
/// with a mock, production wires in [`OllamaClient`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// List models whose capability set includes `completion`.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Fetch one model's descriptor. `Ok(None)` when the daemon has no
    /// such model.
    async fn get_model(&self, name: &str) -> Result<Option<ModelInfo>>;

    /// Start a streaming chat call. The returned sequence is finite and
    /// non-restartable.
    async fn chat_stream(
        &self,
        req: ChatStreamRequest,
    ) -> Result<BoxStream<'static, Result<ChatChunk>>>;

    /// Single-shot chat in structured-output mode: `format` is a JSON
    /// schema the daemon constrains the response to. Returns the raw
    /// content string for the caller to deserialize.
    async fn structured_chat(
        &self,
        model: &str,
        messages: Vec<WireMessage>,
        format: Value,
    ) -> Result<String>;

    /// Cheap reachability probe.
    async fn check_connection(&self) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OllamaClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client for the native Ollama HTTP API.
///
/// Created once at process startup and shared.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::UpstreamUnreachable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn show(&self, name: &str) -> Result<Option<ShowResponse>> {
        let resp = self
            .client
            .post(self.url("/api/show"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(from_transport)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        let show = resp.json::<ShowResponse>().await.map_err(from_protocol)?;
        Ok(Some(show))
    }

    /// Build the `/api/chat` body shared by streaming and structured calls.
    fn chat_body(req: &ChatStreamRequest, stream: bool, format: Option<&Value>) -> Value {
        let mut body = serde_json::json!({
            "model": req.model,
            "messages": req.messages,
            "stream": stream,
        });
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.clone());
        }
        if let Some(think) = req.think {
            body["think"] = Value::Bool(think);
        }
        if let Some(num_ctx) = req.num_ctx {
            body["options"] = serde_json::json!({ "num_ctx": num_ctx });
        }
        if let Some(format) = format {
            body["format"] = format.clone();
        }
        body
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let resp = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(from_transport)?;
        let resp = check_status(resp).await?;
        let tags = resp.json::<TagsResponse>().await.map_err(from_protocol)?;

        let mut models = Vec::new();
        for tag in tags.models {
            // One show call per model for capabilities + context length.
            match self.show(&tag.name).await {
                Ok(Some(show)) => {
                    let info = ModelInfo::from_wire(&tag.name, tag.size, &show);
                    if info.supports_completion() {
                        models.push(info);
                    } else {
                        tracing::debug!(model = %tag.name, "skipping non-completion model");
                    }
                }
                Ok(None) => {
                    tracing::warn!(model = %tag.name, "model vanished between list and show");
                }
                Err(e) => {
                    tracing::warn!(model = %tag.name, error = %e, "failed to fetch model details");
                }
            }
        }

        tracing::debug!(count = models.len(), "listed completion-capable models");
        Ok(models)
    }

    async fn get_model(&self, name: &str) -> Result<Option<ModelInfo>> {
        Ok(self
            .show(name)
            .await?
            .map(|show| ModelInfo::from_wire(name, 0, &show)))
    }

    async fn chat_stream(
        &self,
        req: ChatStreamRequest,
    ) -> Result<BoxStream<'static, Result<ChatChunk>>> {
        let body = Self::chat_body(&req, true, None);
        let resp = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(from_transport)?;
        let resp = check_status(resp).await?;

        let stream = async_stream::stream! {
            let mut resp = resp;
            let mut buffer = String::new();

            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for line in drain_lines(&mut buffer) {
                            match decode_chunk(&line) {
                                Ok(chunk) => {
                                    let done = chunk.done;
                                    yield Ok(chunk);
                                    if done {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        // Body closed; flush a trailing unterminated line.
                        let tail = buffer.trim();
                        if !tail.is_empty() {
                            yield decode_chunk(tail);
                        }
                        return;
                    }
                    Err(e) => {
                        yield Err(from_transport(e));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn structured_chat(
        &self,
        model: &str,
        messages: Vec<WireMessage>,
        format: Value,
    ) -> Result<String> {
        let req = ChatStreamRequest {
            model: model.to_string(),
            messages,
            ..Default::default()
        };
        let body = Self::chat_body(&req, false, Some(&format));

        let resp = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(from_transport)?;
        let resp = check_status(resp).await?;

        let value = resp.json::<Value>().await.map_err(from_protocol)?;
        if let Some(err) = value.get("error").and_then(Value::as_str) {
            return Err(Error::Upstream(err.to_string()));
        }
        value
            .pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Upstream("structured response has no message content".into()))
    }

    async fn check_connection(&self) -> bool {
        match self.client.get(self.url("/api/tags")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_chunk(line: &str) -> Result<ChatChunk> {
    let raw: RawChunk = serde_json::from_str(line)
        .map_err(|e| Error::Upstream(format!("malformed chunk: {e}")))?;
    if let Some(err) = raw.error {
        return Err(Error::Upstream(err));
    }
    Ok(ChatChunk::from(raw))
}

/// Connection-level failures are a distinct kind from daemon errors.
fn from_transport(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::UpstreamUnreachable(e.to_string())
    } else {
        Error::Upstream(e.to_string())
    }
}

fn from_protocol(e: reqwest::Error) -> Error {
    Error::Upstream(e.to_string())
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Upstream(format!("HTTP {status}: {body}")))
}
