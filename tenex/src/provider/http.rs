//! Generic OpenAI-compatible streaming driver.
//!
//! Speaks the chat-completions SSE protocol over reqwest; each SSE event is
//! normalized into zero or more [`StreamChunk`]s. Tool-call argument deltas
//! are accumulated per index and surfaced as `tool-input-*` chunks followed by
//! one `tool-call` chunk per completed call. Unknown wire fields are dropped
//! by the deserializer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use llm_config::ProviderConfig;
use stream_chunk::{FinishReason, LanguageModelUsage, StreamChunk};

use crate::message::{ContentPart, Message, MessageContent, Role};

use super::{
    apply_cache_control, ChunkStream, ProviderDriver, ProviderError, ProviderRequest,
    ToolDefinition,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat-completions driver.
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    provider_id: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
    extra_headers: Vec<(String, String)>,
}

impl HttpProvider {
    pub fn new(provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            provider_id: provider_id.into(),
            model: model.into(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            extra_headers: Vec::new(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut provider = Self::new(config.provider.clone(), config.model.clone());
        provider.api_key = config.api_key.clone();
        if let Some(url) = &config.base_url {
            provider.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(headers) = &config.headers {
            provider.extra_headers = headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        provider
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, request: &ProviderRequest) -> WireRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: Some(WireContent::Text(system.clone())),
                tool_calls: None,
                tool_call_id: None,
                cache_control: None,
            });
        }
        messages.extend(request.messages.iter().map(convert_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(convert_tool).collect())
        };

        WireRequest {
            model: self.model.clone(),
            messages,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            stream: true,
            stream_options: Some(json!({ "include_usage": true })),
            tools,
        }
    }
}

#[async_trait]
impl ProviderDriver for HttpProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn open_stream(&self, mut request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        apply_cache_control(&mut request, &self.provider_id);
        let body = self.build_body(&request);

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let state = Arc::new(Mutex::new(SseState::default()));
        let events = response.bytes_stream().eventsource();

        let chunks = events
            .map(move |result| {
                let state = Arc::clone(&state);
                let out: Vec<Result<StreamChunk, ProviderError>> = match result {
                    Ok(event) => state.lock().unwrap().consume(&event.data),
                    Err(e) => state
                        .lock()
                        .unwrap()
                        .fail(format!("stream error: {}", e)),
                };
                futures::stream::iter(out)
            })
            .flatten();

        // Backends without a reasoning channel inline <thinking> spans in
        // their text; the middleware splits those out.
        Ok(super::extract_reasoning(Box::pin(chunks)))
    }
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("provider_id", &self.provider_id)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Accumulated tool call under construction.
#[derive(Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    started: bool,
}

/// Per-stream parser state shared across SSE events.
#[derive(Default)]
struct SseState {
    tool_calls: Vec<PendingToolCall>,
    usage: Option<LanguageModelUsage>,
    finished: bool,
}

impl SseState {
    /// Parses one SSE event's data into stream chunks.
    fn consume(&mut self, data: &str) -> Vec<Result<StreamChunk, ProviderError>> {
        if self.finished {
            return Vec::new();
        }
        if data == "[DONE]" {
            // Providers that omit finish_reason still get a terminal chunk.
            return self.finish(FinishReason::Stop);
        }

        let chunk: WireChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => return self.fail(format!("failed to parse chunk: {}", e)),
        };

        let mut out = Vec::new();

        if let Some(usage) = chunk.usage {
            let parsed = parse_usage(&usage);
            out.push(Ok(StreamChunk::Usage(parsed.clone())));
            self.usage = Some(parsed);
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(reasoning) = choice
                .delta
                .reasoning_content
                .as_ref()
                .or(choice.delta.reasoning.as_ref())
            {
                if !reasoning.is_empty() {
                    out.push(Ok(StreamChunk::ReasoningDelta {
                        delta: reasoning.clone(),
                    }));
                }
            }

            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    out.push(Ok(StreamChunk::TextDelta {
                        delta: content.clone(),
                    }));
                }
            }

            if let Some(tool_calls) = &choice.delta.tool_calls {
                for tc in tool_calls {
                    let idx = tc.index as usize;
                    while self.tool_calls.len() <= idx {
                        self.tool_calls.push(PendingToolCall::default());
                    }
                    let pending = &mut self.tool_calls[idx];
                    if let Some(id) = &tc.id {
                        pending.id = id.clone();
                    }
                    if let Some(function) = &tc.function {
                        if let Some(name) = &function.name {
                            pending.name = name.clone();
                        }
                        if !pending.started && !pending.name.is_empty() {
                            pending.started = true;
                            out.push(Ok(StreamChunk::ToolInputStart {
                                id: pending.id.clone(),
                                tool_name: pending.name.clone(),
                            }));
                        }
                        if let Some(args) = &function.arguments {
                            if !args.is_empty() {
                                pending.arguments.push_str(args);
                                out.push(Ok(StreamChunk::ToolInputDelta {
                                    id: pending.id.clone(),
                                    delta: args.clone(),
                                }));
                            }
                        }
                    }
                }
            }

            if let Some(reason) = &choice.finish_reason {
                out.extend(self.finish(FinishReason::from_provider(reason)));
            }
        }

        out
    }

    /// Emits completed tool calls (if any) and the terminal finish chunk.
    fn finish(&mut self, reason: FinishReason) -> Vec<Result<StreamChunk, ProviderError>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut out = Vec::new();
        for pending in self.tool_calls.drain(..) {
            if pending.name.is_empty() {
                continue;
            }
            let input: Value =
                serde_json::from_str(&pending.arguments).unwrap_or_else(|_| json!({}));
            out.push(Ok(StreamChunk::ToolInputAvailable {
                id: pending.id.clone(),
                tool_name: pending.name.clone(),
                input: input.clone(),
            }));
            out.push(Ok(StreamChunk::ToolCall {
                call_id: pending.id,
                tool_name: pending.name,
                input,
            }));
        }

        out.push(Ok(StreamChunk::Finish {
            reason,
            usage: self.usage.take(),
            provider_metadata: None,
        }));
        out
    }

    /// Emits a terminal error chunk and suppresses everything after it.
    fn fail(&mut self, message: String) -> Vec<Result<StreamChunk, ProviderError>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![Ok(StreamChunk::Error { message })]
    }
}

fn parse_usage(usage: &WireUsage) -> LanguageModelUsage {
    LanguageModelUsage {
        input_tokens: usage.prompt_tokens.unwrap_or(0),
        output_tokens: usage.completion_tokens.unwrap_or(0),
        total_tokens: usage.total_tokens.unwrap_or(0),
        cached_input_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|d| d.cached_tokens),
        reasoning_tokens: usage
            .completion_tokens_details
            .as_ref()
            .and_then(|d| d.reasoning_tokens),
        cost_usd: usage.cost,
        context_window: None,
    }
}

fn convert_message(msg: &Message) -> WireMessage {
    let role = msg.role.to_string();
    match &msg.content {
        MessageContent::Text(text) => WireMessage {
            role,
            content: Some(WireContent::Text(text.clone())),
            tool_calls: None,
            tool_call_id: None,
            cache_control: msg.cache_control.map(|_| json!({ "type": "ephemeral" })),
        },
        MessageContent::Parts(parts) => {
            let mut wire_parts = Vec::new();
            let mut tool_calls = Vec::new();
            let mut tool_call_id = None;

            for part in parts {
                match part {
                    ContentPart::Text { text } => wire_parts.push(json!({
                        "type": "text",
                        "text": text,
                    })),
                    ContentPart::Image { url } => wire_parts.push(json!({
                        "type": "image_url",
                        "image_url": { "url": url },
                    })),
                    ContentPart::File { path, media_type } => wire_parts.push(json!({
                        "type": "file",
                        "file": { "path": path, "media_type": media_type },
                    })),
                    ContentPart::ToolCall {
                        call_id,
                        name,
                        input,
                    } => tool_calls.push(json!({
                        "id": call_id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": serde_json::to_string(input).unwrap_or_default(),
                        },
                    })),
                    ContentPart::ToolResult { call_id, output } => {
                        tool_call_id = Some(call_id.clone());
                        wire_parts.push(json!({ "type": "text", "text": output }));
                    }
                }
            }

            // Tool messages carry plain text content on the wire.
            let content = if msg.role == Role::Tool {
                let text = parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::ToolResult { output, .. } => Some(output.as_str()),
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("");
                Some(WireContent::Text(text))
            } else if wire_parts.is_empty() {
                None
            } else {
                Some(WireContent::Parts(wire_parts))
            };

            WireMessage {
                role,
                content,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id,
                cache_control: msg.cache_control.map(|_| json!({ "type": "ephemeral" })),
            }
        }
    }
}

fn convert_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

// Wire types. Unknown fields are dropped by serde.

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<Value>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<Value>),
}

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    prompt_tokens_details: Option<WirePromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<WireCompletionTokensDetails>,
    /// OpenRouter surfaces the call's cost here.
    #[serde(default)]
    cost: Option<f64>,
}

#[derive(Deserialize)]
struct WirePromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct WireCompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_chunk::ChunkKind;

    fn collect(state: &mut SseState, data: &str) -> Vec<StreamChunk> {
        state
            .consume(data)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn consume_text_delta() {
        let mut state = SseState::default();
        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{"content":"Hi"}}]}"#,
        );
        assert_eq!(
            chunks,
            vec![StreamChunk::TextDelta {
                delta: "Hi".to_string()
            }]
        );
    }

    #[test]
    fn consume_reasoning_delta_from_either_field() {
        let mut state = SseState::default();
        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{"reasoning_content":"thinking"}}]}"#,
        );
        assert_eq!(chunks[0].kind(), ChunkKind::ReasoningDelta);

        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{"reasoning":"more"}}]}"#,
        );
        assert_eq!(chunks[0].kind(), ChunkKind::ReasoningDelta);
    }

    #[test]
    fn tool_call_accumulation_emits_start_delta_then_call() {
        let mut state = SseState::default();
        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"grep","arguments":"{\"pat"}}]}}]}"#,
        );
        assert_eq!(chunks[0].kind(), ChunkKind::ToolInputStart);
        assert_eq!(chunks[1].kind(), ChunkKind::ToolInputDelta);

        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"tern\":\"x\"}"}}]}}]}"#,
        );
        assert_eq!(chunks[0].kind(), ChunkKind::ToolInputDelta);

        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        );
        assert_eq!(chunks[0].kind(), ChunkKind::ToolInputAvailable);
        match &chunks[1] {
            StreamChunk::ToolCall {
                call_id,
                tool_name,
                input,
            } => {
                assert_eq!(call_id, "c1");
                assert_eq!(tool_name, "grep");
                assert_eq!(input["pattern"], "x");
            }
            other => panic!("expected tool-call, got {:?}", other),
        }
        match &chunks[2] {
            StreamChunk::Finish { reason, .. } => {
                assert_eq!(*reason, FinishReason::ToolCalls)
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn usage_chunk_precedes_finish_and_is_attached() {
        let mut state = SseState::default();
        let chunks = collect(
            &mut state,
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":4,"total_tokens":14,"cost":0.002}}"#,
        );
        match &chunks[0] {
            StreamChunk::Usage(u) => {
                assert_eq!(u.total_tokens, 14);
                assert_eq!(u.cost_usd, Some(0.002));
            }
            other => panic!("expected usage, got {:?}", other),
        }

        let chunks = collect(
            &mut state,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        );
        match &chunks[0] {
            StreamChunk::Finish { usage, .. } => {
                assert_eq!(usage.as_ref().unwrap().total_tokens, 14)
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn done_marker_after_finish_is_suppressed() {
        let mut state = SseState::default();
        collect(
            &mut state,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        );
        assert!(state.consume("[DONE]").is_empty());
    }

    #[test]
    fn done_without_finish_reason_yields_stop() {
        let mut state = SseState::default();
        let chunks = collect(&mut state, "[DONE]");
        assert_eq!(chunks.len(), 1);
        assert!(matches!(
            chunks[0],
            StreamChunk::Finish {
                reason: FinishReason::Stop,
                ..
            }
        ));
    }

    #[test]
    fn malformed_chunk_becomes_terminal_error() {
        let mut state = SseState::default();
        let chunks = collect(&mut state, "not json");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind(), ChunkKind::Error);
        // Nothing more after the terminal chunk.
        assert!(state
            .consume(r#"{"choices":[{"delta":{"content":"late"}}]}"#)
            .is_empty());
    }

    #[test]
    fn convert_message_maps_tool_result_to_tool_call_id() {
        let msg = Message::tool_result("c9", "result text");
        let wire = convert_message(&msg);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("c9"));
        match wire.content {
            Some(WireContent::Text(t)) => assert_eq!(t, "result text"),
            _ => panic!("expected text content"),
        }
    }
}
