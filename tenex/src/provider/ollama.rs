//! Ollama driver: local endpoint speaking newline-delimited JSON.
//!
//! No API key; the default endpoint is `http://localhost:11434`. Each NDJSON
//! line carries a message fragment; the final line (`"done": true`) carries
//! eval counts that map onto usage.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use llm_config::ProviderConfig;
use stream_chunk::{FinishReason, LanguageModelUsage, StreamChunk};

use super::{ChunkStream, ProviderDriver, ProviderError, ProviderRequest};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local ollama chat driver.
pub struct OllamaProvider {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut provider = Self::new(config.model.clone());
        if let Some(url) = &config.base_url {
            provider.base_url = url.trim_end_matches('/').to_string();
        }
        provider
    }

    fn build_body(&self, request: &ProviderRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for msg in &request.messages {
            messages.push(json!({
                "role": msg.role.to_string(),
                "content": msg.as_text(),
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            },
                        })
                    })
                    .collect(),
            );
        }
        let mut options = serde_json::Map::new();
        if let Some(t) = request.options.temperature {
            options.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.options.max_tokens {
            options.insert("num_predict".to_string(), json!(n));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        body
    }
}

#[async_trait]
impl ProviderDriver for OllamaProvider {
    fn provider_id(&self) -> &str {
        "ollama"
    }

    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let body = self.build_body(&request);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let state = Arc::new(Mutex::new(NdjsonState::default()));
        let bytes = response.bytes_stream();

        let chunks = bytes
            .map(move |result| {
                let state = Arc::clone(&state);
                let out: Vec<Result<StreamChunk, ProviderError>> = match result {
                    Ok(bytes) => state.lock().unwrap().consume(&bytes),
                    Err(e) => state.lock().unwrap().fail(format!("stream error: {}", e)),
                };
                futures::stream::iter(out)
            })
            .flatten();

        Ok(Box::pin(chunks))
    }
}

/// Line buffer and terminal flag shared across byte chunks.
#[derive(Default)]
struct NdjsonState {
    buffer: String,
    next_call: u64,
    finished: bool,
}

impl NdjsonState {
    fn consume(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, ProviderError>> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            out.extend(self.consume_line(line));
            if self.finished {
                break;
            }
        }
        out
    }

    fn consume_line(&mut self, line: &str) -> Vec<Result<StreamChunk, ProviderError>> {
        let parsed: OllamaLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(e) => return self.fail(format!("failed to parse line: {}", e)),
        };

        let mut out = Vec::new();
        if let Some(message) = &parsed.message {
            if let Some(content) = &message.content {
                if !content.is_empty() {
                    out.push(Ok(StreamChunk::TextDelta {
                        delta: content.clone(),
                    }));
                }
            }
            if let Some(tool_calls) = &message.tool_calls {
                for tc in tool_calls {
                    self.next_call += 1;
                    let call_id = format!("ollama-call-{}", self.next_call);
                    out.push(Ok(StreamChunk::ToolInputAvailable {
                        id: call_id.clone(),
                        tool_name: tc.function.name.clone(),
                        input: tc.function.arguments.clone(),
                    }));
                    out.push(Ok(StreamChunk::ToolCall {
                        call_id,
                        tool_name: tc.function.name.clone(),
                        input: tc.function.arguments.clone(),
                    }));
                }
            }
        }

        if parsed.done {
            self.finished = true;
            let input = parsed.prompt_eval_count.unwrap_or(0);
            let output = parsed.eval_count.unwrap_or(0);
            let usage = LanguageModelUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: input + output,
                ..Default::default()
            };
            out.push(Ok(StreamChunk::Usage(usage.clone())));
            let reason = parsed
                .done_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or(FinishReason::Stop);
            out.push(Ok(StreamChunk::Finish {
                reason,
                usage: Some(usage),
                provider_metadata: None,
            }));
        }
        out
    }

    fn fail(&mut self, message: String) -> Vec<Result<StreamChunk, ProviderError>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![Ok(StreamChunk::Error { message })]
    }
}

#[derive(Deserialize)]
struct OllamaLine {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}
