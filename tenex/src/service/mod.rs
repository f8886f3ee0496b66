//! LLM service: drive one inference call end-to-end.
//!
//! The service sanitizes the prompt, opens a provider stream, relays typed
//! events (with `chunk-type-change` boundaries) over an mpsc channel,
//! executes tools mid-stream through the registry, loops for up to
//! [`MAX_STEPS`] model steps, and finalizes with aggregated usage, the
//! model's context window, and the finish reason. A flight recorder,
//! gated by the process-wide [`RecordingState`], persists one JSONL line per
//! call and never affects the request path.

mod events;
mod recorder;
mod sanitizer;

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use stream_chunk::{ChunkKind, FinishReason, LanguageModelUsage, StreamChunk};

use crate::logging::{
    LlmCallLogger, LlmCallRecord, LoggedMessage, LoggedRequest, LoggedResponse, LoggedToolCall,
    LoggedUsage, WarnLog,
};
use crate::message::{ContentPart, Message, MessageContent};
use crate::model_spec::ModelSpecResolver;
use crate::provider::{ProviderDriver, ProviderError, ProviderRequest, RequestOptions};
use crate::router::ResolvedConfig;
use crate::tools::{is_delegation_tool, ExecutionContext, ToolInvocation, ToolRegistry,
    ToolResultEnvelope};

pub use events::ServiceEvent;
pub use recorder::RecordingState;
pub use sanitizer::{
    sanitize, sanitize_and_log, AppliedFix, CallType, CompletionParams, FixKind, RemovedMessage,
};

/// A stream completes after at most this many model steps.
pub const MAX_STEPS: usize = 50;

/// Cosmetic reminder injected after a delegation step that yielded responses.
const FOLLOWUP_REMINDER: &str = "The delegation returned responses. If anything is unclear, you \
     may use delegate_followup() to ask a clarifying question before proceeding.";

/// Service errors; both abort the turn.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("turn aborted")]
    Aborted,
}

/// A tool call whose name failed schema resolution. Recorded, not fatal.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidToolCall {
    pub name: String,
    pub call_id: String,
}

/// Terminal result of one inference call.
#[derive(Clone, Debug)]
pub struct Completion {
    pub message: Message,
    pub steps: usize,
    pub usage: LanguageModelUsage,
    pub finish_reason: FinishReason,
    pub session_id: Option<String>,
    pub invalid_tool_calls: Vec<InvalidToolCall>,
    pub tool_results: Vec<ToolResultEnvelope>,
}

/// Drives single inference calls against one resolved config.
pub struct LlmService {
    driver: Arc<dyn ProviderDriver>,
    config: ResolvedConfig,
    tools: Arc<ToolRegistry>,
    options: RequestOptions,
    specs: Option<Arc<dyn ModelSpecResolver>>,
    call_logger: Option<Arc<LlmCallLogger>>,
    recording: Option<Arc<RecordingState>>,
    warn_log: Option<WarnLog>,
}

impl LlmService {
    pub fn new(
        driver: Arc<dyn ProviderDriver>,
        config: ResolvedConfig,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let options = RequestOptions::from_config(&config.config);
        Self {
            driver,
            config,
            tools,
            options,
            specs: None,
            call_logger: None,
            recording: None,
            warn_log: None,
        }
    }

    /// Overrides the request options (e.g. agent-scoped routing injects the
    /// agent name here).
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches the model-spec resolver used to stamp the context window
    /// onto finalized usage.
    pub fn with_model_specs(mut self, specs: Arc<dyn ModelSpecResolver>) -> Self {
        self.specs = Some(specs);
        self
    }

    /// Attaches the flight recorder and its gate.
    pub fn with_recorder(
        mut self,
        logger: Arc<LlmCallLogger>,
        recording: Arc<RecordingState>,
    ) -> Self {
        self.call_logger = Some(logger);
        self.recording = Some(recording);
        self
    }

    /// Attaches the sanitizer warn-log sink.
    pub fn with_warn_log(mut self, warn_log: WarnLog) -> Self {
        self.warn_log = Some(warn_log);
        self
    }

    /// Drives one inference call. Events stream over `events` as they occur;
    /// the returned [`Completion`] mirrors the terminal `Complete` event.
    pub async fn complete(
        &self,
        params: CompletionParams,
        ctx: &ExecutionContext,
        events: &mpsc::Sender<ServiceEvent>,
        cancel: &CancellationToken,
    ) -> Result<Completion, ServiceError> {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let model_label = self.config.config.label();

        let sanitized = sanitize_and_log(&params, &model_label, self.warn_log.as_ref());
        let mut working = sanitized.messages.clone();
        let system = sanitized.system.clone();
        let logged_request = self.build_logged_request(&sanitized);
        drop(sanitized);

        let mut usage = LanguageModelUsage::default();
        let mut cached_content = String::new();
        let mut last_kind: Option<ChunkKind> = None;
        let mut finish_reason = FinishReason::Stop;
        let mut session_id: Option<String> = None;
        let mut invalid = Vec::new();
        let mut tool_results: Vec<ToolResultEnvelope> = Vec::new();
        let mut all_tool_calls: Vec<(String, Value)> = Vec::new();
        let mut delegation_responded = false;
        let mut steps = 0usize;
        let mut next_call_seq = 0u64;

        'steps: while steps < MAX_STEPS {
            steps += 1;

            // Delegation follow-up hook: after a step whose last tool call was
            // a delegation that yielded responses, remind the model it can
            // issue a follow-up. Cosmetic, not load-bearing.
            if std::mem::take(&mut delegation_responded) {
                working.push(Message::assistant(FOLLOWUP_REMINDER));
            }

            let mut options = self.options.clone();
            if options.session_id.is_none() {
                options.session_id = session_id.clone();
            }
            let request = ProviderRequest {
                system: system.clone(),
                messages: working.clone(),
                tools: self.tools.definitions(),
                options,
            };

            let mut stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = events.send(ServiceEvent::Error { message: "turn aborted".to_string() }).await;
                    return Err(ServiceError::Aborted);
                }
                result = self.driver.open_stream(request) => match result {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = events.send(ServiceEvent::Error { message: e.to_string() }).await;
                        self.record_error(&request_id, started, &logged_request, &e);
                        return Err(e.into());
                    }
                },
            };

            let mut step_text = String::new();
            let mut step_calls: Vec<(String, String, Value)> = Vec::new();
            let mut step_envelopes: Vec<ToolResultEnvelope> = Vec::new();
            let mut step_usage_seen = false;

            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = events.send(ServiceEvent::Error { message: "turn aborted".to_string() }).await;
                        return Err(ServiceError::Aborted);
                    }
                    item = stream.next() => item,
                };
                let Some(item) = item else {
                    break;
                };
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = events.send(ServiceEvent::Error { message: e.to_string() }).await;
                        self.record_error(&request_id, started, &logged_request, &e);
                        return Err(e.into());
                    }
                };

                // Boundary event strictly precedes the first typed event of a
                // new chunk run.
                let kind = chunk.kind();
                if let Some(prev) = last_kind {
                    if prev != kind {
                        let _ = events
                            .send(ServiceEvent::ChunkTypeChange {
                                from: prev,
                                to: kind,
                            })
                            .await;
                    }
                }
                last_kind = Some(kind);

                match chunk {
                    StreamChunk::TextDelta { delta } => {
                        cached_content.push_str(&delta);
                        step_text.push_str(&delta);
                        let _ = events.send(ServiceEvent::Content { delta }).await;
                    }
                    StreamChunk::ReasoningDelta { delta } => {
                        let _ = events.send(ServiceEvent::Reasoning { delta }).await;
                    }
                    StreamChunk::ToolCall {
                        call_id,
                        tool_name,
                        input,
                    } => {
                        let call_id = if call_id.is_empty() {
                            next_call_seq += 1;
                            format!("call-{}", next_call_seq)
                        } else {
                            call_id
                        };
                        let _ = events
                            .send(ServiceEvent::ToolWillExecute {
                                name: tool_name.clone(),
                                call_id: call_id.clone(),
                                args: input.clone(),
                            })
                            .await;

                        if !self.tools.contains(&tool_name) {
                            invalid.push(InvalidToolCall {
                                name: tool_name.clone(),
                                call_id: call_id.clone(),
                            });
                        }

                        let result = self
                            .tools
                            .run(
                                ToolInvocation {
                                    tool_name: tool_name.clone(),
                                    call_id: call_id.clone(),
                                    raw_input: input.clone(),
                                    validated_input: None,
                                },
                                ctx,
                            )
                            .await;

                        let envelope = result.envelope;
                        // Tracks the LAST tool call of the step: a delegation
                        // that yielded at least one response arms the
                        // follow-up hook, anything after it disarms.
                        delegation_responded = is_delegation_tool(&tool_name)
                            && envelope.success
                            && envelope.output.as_deref().is_some_and(|o| !o.is_empty());

                        let _ = events
                            .send(ServiceEvent::ToolDidExecute {
                                name: tool_name.clone(),
                                call_id: call_id.clone(),
                                result: envelope.clone(),
                            })
                            .await;

                        all_tool_calls.push((tool_name.clone(), input.clone()));
                        step_calls.push((call_id.clone(), tool_name, input));
                        step_envelopes.push(envelope);
                    }
                    StreamChunk::Usage(u) => {
                        usage.add(&u);
                        step_usage_seen = true;
                    }
                    StreamChunk::Finish {
                        reason,
                        usage: step_usage,
                        provider_metadata,
                    } => {
                        if let Some(step_usage) = step_usage {
                            // Providers that emit a separate usage chunk repeat
                            // it here; only count usage not already seen.
                            if !step_usage_seen {
                                usage.add(&step_usage);
                            }
                        }
                        finish_reason = reason;
                        if session_id.is_none() {
                            if let Some(id) = provider_metadata
                                .as_ref()
                                .and_then(|m| m.get("session_id"))
                                .and_then(Value::as_str)
                            {
                                session_id = Some(id.to_string());
                                let _ = events
                                    .send(ServiceEvent::SessionCaptured {
                                        session_id: id.to_string(),
                                    })
                                    .await;
                            }
                        }
                        break;
                    }
                    StreamChunk::Error { message } => {
                        let _ = events
                            .send(ServiceEvent::Error {
                                message: message.clone(),
                            })
                            .await;
                        let e = ProviderError::Stream(message);
                        self.record_error(&request_id, started, &logged_request, &e);
                        return Err(e.into());
                    }
                    // Argument streaming and provider-echoed results carry no
                    // dedicated service event; they still participate in
                    // boundary detection above.
                    StreamChunk::ReasoningStart
                    | StreamChunk::ReasoningEnd
                    | StreamChunk::ToolInputStart { .. }
                    | StreamChunk::ToolInputDelta { .. }
                    | StreamChunk::ToolInputAvailable { .. }
                    | StreamChunk::ToolResult { .. } => {}
                }
            }

            tool_results.extend(step_envelopes.iter().cloned());

            if finish_reason == FinishReason::ToolCalls && !step_calls.is_empty() {
                // Fold the step into the transcript: assistant text + tool
                // calls, then one tool message per result.
                let mut parts = Vec::new();
                if !step_text.is_empty() {
                    parts.push(ContentPart::Text {
                        text: std::mem::take(&mut step_text),
                    });
                }
                for (call_id, name, input) in &step_calls {
                    parts.push(ContentPart::ToolCall {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    });
                }
                working.push(Message::parts(crate::message::Role::Assistant, parts));
                for ((call_id, _, _), envelope) in step_calls.iter().zip(&step_envelopes) {
                    working.push(Message::tool_result(call_id.clone(), envelope.model_text()));
                }
                // Step text was folded into the transcript; the cache restarts
                // for the next step so the final message is not duplicated.
                cached_content.clear();
                continue 'steps;
            }
            break;
        }

        // Finalization. The final message comes from the accumulated cache
        // only; an empty cache means everything was already published at
        // chunk-type-change boundaries.
        let message = Message::assistant(std::mem::take(&mut cached_content));

        for call in &invalid {
            tracing::error!(
                target: "telemetry",
                event = "invalid-tool-call",
                tool = %call.name,
                call_id = %call.call_id,
                "model requested a tool that failed schema resolution"
            );
        }

        if let Some(specs) = &self.specs {
            if let Some(spec) = specs
                .resolve(&self.config.config.provider, &self.config.config.model)
                .await
            {
                usage.context_window = Some(spec.context_limit as u64);
            }
        }

        let _ = events
            .send(ServiceEvent::Complete {
                message: message.clone(),
                steps,
                usage: usage.clone(),
                finish_reason,
            })
            .await;

        let completion = Completion {
            message,
            steps,
            usage,
            finish_reason,
            session_id,
            invalid_tool_calls: invalid,
            tool_results,
        };
        self.record_success(&request_id, started, &logged_request, &completion, &all_tool_calls);
        Ok(completion)
    }

    fn recording_enabled(&self) -> bool {
        self.recording
            .as_ref()
            .map(|r| r.is_enabled())
            .unwrap_or(false)
    }

    fn build_logged_request(&self, params: &CompletionParams) -> LoggedRequest {
        let messages: Vec<LoggedMessage> = params
            .messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text(text) => LoggedMessage {
                    role: m.role.to_string(),
                    content: Some(text.clone()),
                    parsed_content: None,
                    content_length: text.len(),
                },
                MessageContent::Parts(parts) => {
                    let parsed = serde_json::to_value(parts).unwrap_or(Value::Null);
                    LoggedMessage {
                        role: m.role.to_string(),
                        content: None,
                        content_length: m.as_text().len(),
                        parsed_content: Some(parsed),
                    }
                }
            })
            .collect();
        let total = messages.iter().map(|m| m.content_length).sum();
        LoggedRequest {
            message_count: messages.len(),
            total_request_length: total,
            messages,
            options: json!({
                "temperature": self.options.temperature,
                "maxTokens": self.options.max_tokens,
                "agentName": self.options.agent_name,
            }),
        }
    }

    fn record_success(
        &self,
        request_id: &str,
        started: Instant,
        request: &LoggedRequest,
        completion: &Completion,
        tool_calls: &[(String, Value)],
    ) {
        if !self.recording_enabled() {
            return;
        }
        let Some(logger) = &self.call_logger else {
            return;
        };
        let content = completion.message.as_text();
        let response = LoggedResponse {
            content_length: content.len(),
            content,
            tool_calls: tool_calls
                .iter()
                .map(|(name, params)| LoggedToolCall {
                    name: name.clone(),
                    params_length: params.to_string().len(),
                    params: params.clone(),
                })
                .collect(),
            tool_call_count: tool_calls.len(),
            usage: Some(LoggedUsage {
                prompt_tokens: completion.usage.input_tokens,
                completion_tokens: completion.usage.output_tokens,
                total_tokens: completion.usage.total_tokens,
            }),
        };
        let record = self.base_record(request_id, started, request.clone());
        let record = LlmCallRecord {
            response: Some(response),
            status: "success".to_string(),
            ..record
        };
        if let Err(e) = logger.append(&record) {
            tracing::error!(error = %e, "failed to append llm call record");
        }
    }

    fn record_error(
        &self,
        request_id: &str,
        started: Instant,
        request: &LoggedRequest,
        error: &ProviderError,
    ) {
        if !self.recording_enabled() {
            return;
        }
        let Some(logger) = &self.call_logger else {
            return;
        };
        let record = self.base_record(request_id, started, request.clone());
        let record = LlmCallRecord {
            error: Some(crate::logging::LoggedError {
                message: error.to_string(),
                stack: None,
                error_type: "provider".to_string(),
            }),
            status: "error".to_string(),
            ..record
        };
        if let Err(e) = logger.append(&record) {
            tracing::error!(error = %e, "failed to append llm call record");
        }
    }

    fn base_record(
        &self,
        request_id: &str,
        started: Instant,
        request: LoggedRequest,
    ) -> LlmCallRecord {
        let now = chrono::Utc::now();
        LlmCallRecord {
            timestamp: now.to_rfc3339(),
            timestamp_ms: now.timestamp_millis(),
            request_id: request_id.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            config_key: self.config.key.clone(),
            config: serde_json::to_value(&self.config.config).unwrap_or(Value::Null),
            agent_name: self.options.agent_name.clone(),
            request,
            response: None,
            error: None,
            status: String::new(),
        }
    }
}
