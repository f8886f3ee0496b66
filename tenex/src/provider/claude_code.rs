//! Claude-code driver: local subprocess speaking the CLI's stream-json
//! protocol.
//!
//! Session handling: when the request carries a `session_id`, the driver
//! passes `--resume` and does NOT re-send compiled system prompts; otherwise
//! the message list's system messages are compiled into a
//! `{custom_system_prompt, append_system_prompt}` pair. The session id
//! observed on the wire is surfaced through the finish chunk's provider
//! metadata so the service can emit `session-captured` exactly once.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;

use llm_config::ProviderConfig;
use stream_chunk::{FinishReason, LanguageModelUsage, StreamChunk};

use crate::message::{Message, Role};

use super::{ChunkStream, ProviderDriver, ProviderError, ProviderRequest};

const DEFAULT_BINARY: &str = "claude";

/// System prompts compiled from a message list for a fresh session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledSystemPrompts {
    /// The first system message; replaces the CLI's own system prompt.
    pub custom_system_prompt: Option<String>,
    /// Remaining system messages, appended after the custom prompt.
    pub append_system_prompt: Option<String>,
}

/// Compiles the system messages of a request into the CLI's prompt pair.
pub fn compile_system_prompts(
    system: Option<&str>,
    messages: &[Message],
) -> CompiledSystemPrompts {
    let mut system_texts: Vec<String> = Vec::new();
    if let Some(s) = system {
        if !s.is_empty() {
            system_texts.push(s.to_string());
        }
    }
    system_texts.extend(
        messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::as_text)
            .filter(|s| !s.is_empty()),
    );

    let mut iter = system_texts.into_iter();
    let custom = iter.next();
    let rest: Vec<String> = iter.collect();
    CompiledSystemPrompts {
        custom_system_prompt: custom,
        append_system_prompt: if rest.is_empty() {
            None
        } else {
            Some(rest.join("\n\n"))
        },
    }
}

/// Local claude CLI subprocess driver.
pub struct ClaudeCodeProvider {
    binary: String,
    model: Option<String>,
}

impl ClaudeCodeProvider {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            model: None,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            // base_url doubles as a binary override for the subprocess driver.
            binary: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            model: Some(config.model.clone()),
        }
    }

    fn build_args(&self, request: &ProviderRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(session_id) = &request.options.session_id {
            // Resumed sessions already hold the system prompts.
            args.push("--resume".to_string());
            args.push(session_id.clone());
        } else {
            let prompts = compile_system_prompts(request.system.as_deref(), &request.messages);
            if let Some(custom) = prompts.custom_system_prompt {
                args.push("--system-prompt".to_string());
                args.push(custom);
            }
            if let Some(append) = prompts.append_system_prompt {
                args.push("--append-system-prompt".to_string());
                args.push(append);
            }
        }
        args
    }

    fn prompt_text(request: &ProviderRequest) -> String {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::as_text)
            .unwrap_or_default()
    }
}

impl Default for ClaudeCodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderDriver for ClaudeCodeProvider {
    fn provider_id(&self) -> &str {
        "claude-code"
    }

    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let args = self.build_args(&request);
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Subprocess(format!("spawn {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = Self::prompt_text(&request);
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ProviderError::Subprocess(format!("write prompt: {}", e)))?;
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Subprocess("no stdout".to_string()))?;
        let lines = LinesStream::new(tokio::io::BufReader::new(stdout).lines());

        let state = Arc::new(Mutex::new(CliState::default()));
        // The child is owned by the stream so it is reaped when the stream drops.
        let child = Arc::new(Mutex::new(Some(child)));

        let chunks = lines
            .map(move |result| {
                let _child = Arc::clone(&child);
                let state = Arc::clone(&state);
                let out: Vec<Result<StreamChunk, ProviderError>> = match result {
                    Ok(line) => state.lock().unwrap().consume_line(&line),
                    Err(e) => state.lock().unwrap().fail(format!("read stdout: {}", e)),
                };
                futures::stream::iter(out)
            })
            .flatten();

        Ok(Box::pin(chunks))
    }
}

/// Parser state across CLI stream-json lines.
#[derive(Default)]
struct CliState {
    session_id: Option<String>,
    finished: bool,
}

impl CliState {
    fn consume_line(&mut self, line: &str) -> Vec<Result<StreamChunk, ProviderError>> {
        if self.finished {
            return Vec::new();
        }
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let event: CliEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            // Non-JSON noise on stdout is skipped rather than fatal.
            Err(_) => return Vec::new(),
        };

        if let Some(id) = &event.session_id {
            self.session_id = Some(id.clone());
        }

        match event.kind.as_str() {
            "assistant" => {
                let mut out = Vec::new();
                if let Some(message) = &event.message {
                    for block in &message.content {
                        match block.kind.as_str() {
                            "text" => {
                                if let Some(text) = &block.text {
                                    if !text.is_empty() {
                                        out.push(Ok(StreamChunk::TextDelta {
                                            delta: text.clone(),
                                        }));
                                    }
                                }
                            }
                            "thinking" => {
                                if let Some(text) = &block.thinking {
                                    if !text.is_empty() {
                                        out.push(Ok(StreamChunk::ReasoningDelta {
                                            delta: text.clone(),
                                        }));
                                    }
                                }
                            }
                            "tool_use" => {
                                let id = block.id.clone().unwrap_or_default();
                                let name = block.name.clone().unwrap_or_default();
                                let input = block.input.clone().unwrap_or_else(|| json!({}));
                                out.push(Ok(StreamChunk::ToolInputAvailable {
                                    id: id.clone(),
                                    tool_name: name.clone(),
                                    input: input.clone(),
                                }));
                                out.push(Ok(StreamChunk::ToolCall {
                                    call_id: id,
                                    tool_name: name,
                                    input,
                                }));
                            }
                            _ => {}
                        }
                    }
                }
                out
            }
            "result" => {
                self.finished = true;
                let mut out = Vec::new();
                let usage = event.usage.as_ref().map(|u| LanguageModelUsage {
                    input_tokens: u.input_tokens.unwrap_or(0),
                    output_tokens: u.output_tokens.unwrap_or(0),
                    total_tokens: u.input_tokens.unwrap_or(0) + u.output_tokens.unwrap_or(0),
                    cached_input_tokens: u.cache_read_input_tokens,
                    ..Default::default()
                });
                if let Some(usage) = &usage {
                    out.push(Ok(StreamChunk::Usage(usage.clone())));
                }
                let reason = if event.is_error.unwrap_or(false) {
                    FinishReason::Error
                } else {
                    FinishReason::Stop
                };
                let provider_metadata = self
                    .session_id
                    .as_ref()
                    .map(|id| json!({ "session_id": id }));
                out.push(Ok(StreamChunk::Finish {
                    reason,
                    usage,
                    provider_metadata,
                }));
                out
            }
            // The CLI echoes its own tool results as user-role lines.
            "user" => {
                let mut out = Vec::new();
                if let Some(message) = &event.message {
                    for block in &message.content {
                        if block.kind == "tool_result" {
                            out.push(Ok(StreamChunk::ToolResult {
                                call_id: block.tool_use_id.clone().unwrap_or_default(),
                                tool_name: String::new(),
                                output: block.text.clone().unwrap_or_default(),
                            }));
                        }
                    }
                }
                out
            }
            // "system" init lines only carry the session id, captured above.
            _ => Vec::new(),
        }
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
struct CliEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: Option<CliMessage>,
    #[serde(default)]
    usage: Option<CliUsage>,
    #[serde(default)]
    is_error: Option<bool>,
}

#[derive(Deserialize)]
struct CliMessage {
    #[serde(default)]
    content: Vec<CliContentBlock>,
}

#[derive(Deserialize)]
struct CliContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    tool_use_id: Option<String>,
}

#[derive(Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RequestOptions;
    use stream_chunk::ChunkKind;

    #[test]
    fn compile_splits_first_system_from_the_rest() {
        let messages = vec![
            Message::system("You are the orchestrator."),
            Message::user("hi"),
            Message::system("Prefer short answers."),
            Message::system("Use the project glossary."),
        ];
        let prompts = compile_system_prompts(None, &messages);
        assert_eq!(
            prompts.custom_system_prompt.as_deref(),
            Some("You are the orchestrator.")
        );
        assert_eq!(
            prompts.append_system_prompt.as_deref(),
            Some("Prefer short answers.\n\nUse the project glossary.")
        );
    }

    #[test]
    fn compile_with_separate_system_param_puts_it_first() {
        let messages = vec![Message::system("appended")];
        let prompts = compile_system_prompts(Some("primary"), &messages);
        assert_eq!(prompts.custom_system_prompt.as_deref(), Some("primary"));
        assert_eq!(prompts.append_system_prompt.as_deref(), Some("appended"));
    }

    #[test]
    fn resume_skips_system_prompt_args() {
        let provider = ClaudeCodeProvider::new();
        let request = ProviderRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            options: RequestOptions {
                session_id: Some("sess-9".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let args = provider.build_args(&request);
        assert!(args.contains(&"--resume".to_string()));
        assert!(args.contains(&"sess-9".to_string()));
        assert!(!args.iter().any(|a| a == "--system-prompt"));
        assert!(!args.iter().any(|a| a == "--append-system-prompt"));
    }

    #[test]
    fn fresh_session_compiles_system_prompts_into_args() {
        let provider = ClaudeCodeProvider::new();
        let request = ProviderRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            ..Default::default()
        };
        let args = provider.build_args(&request);
        assert!(args.contains(&"--system-prompt".to_string()));
        assert!(args.contains(&"sys".to_string()));
        assert!(!args.contains(&"--resume".to_string()));
    }

    #[test]
    fn result_line_carries_session_id_in_provider_metadata() {
        let mut state = CliState::default();
        state.consume_line(r#"{"type":"system","subtype":"init","session_id":"sess-42"}"#);
        let chunks: Vec<StreamChunk> = state
            .consume_line(r#"{"type":"result","subtype":"success","usage":{"input_tokens":3,"output_tokens":2}}"#)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(chunks[0].kind(), ChunkKind::Usage);
        match &chunks[1] {
            StreamChunk::Finish {
                provider_metadata, ..
            } => {
                assert_eq!(
                    provider_metadata.as_ref().unwrap()["session_id"],
                    "sess-42"
                );
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn assistant_line_with_tool_use_emits_tool_call() {
        let mut state = CliState::default();
        let chunks: Vec<StreamChunk> = state
            .consume_line(
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"read_file","input":{"path":"/a"}}]}}"#,
            )
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(chunks[0].kind(), ChunkKind::ToolInputAvailable);
        assert_eq!(chunks[1].kind(), ChunkKind::ToolCall);
    }
}
