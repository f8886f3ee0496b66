//! Provider adapters: uniform streaming drivers over concrete LLM backends.
//!
//! Each backend implements [`ProviderDriver`]: open a chunk stream for a
//! request, or fold it into a [`FinalResult`]. Backends normalize their wire
//! format into the [`StreamChunk`] taxonomy; unknown provider fields are
//! dropped at the parse layer.
//!
//! Supported backends: [`HttpProvider`] (OpenAI-compatible),
//! [`OpenRouterProvider`], [`OllamaProvider`], and [`ClaudeCodeProvider`]
//! (local subprocess with session resume).

mod cache_control;
mod claude_code;
mod http;
mod ollama;
mod openrouter;
mod reasoning;

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use llm_config::ProviderConfig;
use stream_chunk::{FinishReason, LanguageModelUsage, StreamChunk};

use crate::message::Message;

pub use cache_control::{apply_cache_control, CACHE_SYSTEM_PROMPT_MIN_CHARS};
pub use claude_code::{compile_system_prompts, ClaudeCodeProvider, CompiledSystemPrompts};
pub use http::HttpProvider;
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;
pub use reasoning::{extract_reasoning, ReasoningExtractor};

/// A provider's chunk stream. Terminates with exactly one `Finish` or `Error`
/// chunk; transport failures surface as `Err` items and also terminate.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Errors from a provider transport or protocol layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("subprocess: {0}")]
    Subprocess(String),
    #[error("unsupported provider: {0}")]
    Unsupported(String),
}

/// Tool surface offered to the model for one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Per-request options, merged from the resolved config and the caller.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Provider session to resume (claude-code family).
    pub session_id: Option<String>,
    /// Requesting agent, injected by agent-scoped routing.
    pub agent_name: Option<String>,
    /// Whether explicit prompt-cache markers should be applied.
    pub enable_caching: bool,
    /// Free-form request metadata (e.g. phase, iteration) consumed by
    /// drivers that match on it, such as the mock harness.
    pub metadata: BTreeMap<String, String>,
}

impl RequestOptions {
    /// Seeds options from a resolved provider config.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            enable_caching: config.enable_caching.unwrap_or(false),
            ..Default::default()
        }
    }
}

/// One inference request handed to a driver. Messages are pre-validated by
/// the service's sanitizer.
#[derive(Clone, Debug, Default)]
pub struct ProviderRequest {
    /// System prompt kept separate from the message list, when the caller
    /// provides one that way.
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub options: RequestOptions,
}

/// Result of folding one full stream.
#[derive(Clone, Debug, Default)]
pub struct FinalResult {
    pub text: String,
    pub tool_calls: Vec<(String, String, Value)>,
    pub usage: LanguageModelUsage,
    pub finish_reason: Option<FinishReason>,
    pub provider_metadata: Option<Value>,
}

/// Uniform streaming driver over one concrete LLM backend.
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    /// Stable id of the backend ("openrouter", "ollama", "claude-code", ...).
    fn provider_id(&self) -> &str;

    /// Opens a chunk stream for the request.
    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError>;

    /// Folds the stream into a final result. An `Error` chunk becomes an
    /// `Err`; chunks delivered before it are not retracted from the fold.
    async fn generate(&self, request: ProviderRequest) -> Result<FinalResult, ProviderError> {
        use futures::StreamExt;

        let mut stream = self.open_stream(request).await?;
        let mut result = FinalResult::default();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::TextDelta { delta } => result.text.push_str(&delta),
                StreamChunk::ToolCall {
                    call_id,
                    tool_name,
                    input,
                } => result.tool_calls.push((call_id, tool_name, input)),
                StreamChunk::Usage(usage) => result.usage.add(&usage),
                StreamChunk::Finish {
                    reason,
                    usage,
                    provider_metadata,
                } => {
                    if let Some(usage) = usage {
                        result.usage.add(&usage);
                    }
                    result.finish_reason = Some(reason);
                    result.provider_metadata = provider_metadata;
                }
                StreamChunk::Error { message } => {
                    return Err(ProviderError::Stream(message));
                }
                _ => {}
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl ProviderDriver for Arc<dyn ProviderDriver> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        (**self).open_stream(request).await
    }

    async fn generate(&self, request: ProviderRequest) -> Result<FinalResult, ProviderError> {
        (**self).generate(request).await
    }
}

/// Builds the driver for a resolved config.
///
/// Unknown provider ids fall back to the generic OpenAI-compatible driver
/// when a base URL is configured; otherwise they are rejected.
pub fn driver_for_config(config: &ProviderConfig) -> Result<Arc<dyn ProviderDriver>, ProviderError> {
    match config.provider.as_str() {
        "openrouter" => Ok(Arc::new(OpenRouterProvider::from_config(config))),
        "ollama" => Ok(Arc::new(OllamaProvider::from_config(config))),
        "claude-code" => Ok(Arc::new(ClaudeCodeProvider::from_config(config))),
        other => {
            if config.base_url.is_some() {
                Ok(Arc::new(HttpProvider::from_config(config)))
            } else {
                Err(ProviderError::Unsupported(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    struct ScriptedDriver {
        chunks: Vec<StreamChunk>,
    }

    #[async_trait]
    impl ProviderDriver for ScriptedDriver {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn open_stream(
            &self,
            _request: ProviderRequest,
        ) -> Result<ChunkStream, ProviderError> {
            let chunks: Vec<Result<StreamChunk, ProviderError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn generate_folds_text_tool_calls_and_usage() {
        let driver = ScriptedDriver {
            chunks: vec![
                StreamChunk::TextDelta {
                    delta: "Hel".to_string(),
                },
                StreamChunk::TextDelta {
                    delta: "lo".to_string(),
                },
                StreamChunk::ToolCall {
                    call_id: "c1".to_string(),
                    tool_name: "grep".to_string(),
                    input: json!({ "pattern": "x" }),
                },
                StreamChunk::Usage(LanguageModelUsage {
                    input_tokens: 5,
                    output_tokens: 2,
                    total_tokens: 7,
                    ..Default::default()
                }),
                StreamChunk::Finish {
                    reason: FinishReason::Stop,
                    usage: None,
                    provider_metadata: Some(json!({ "session_id": "s-1" })),
                },
            ],
        };

        let result = driver.generate(ProviderRequest::default()).await.unwrap();
        assert_eq!(result.text, "Hello");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.usage.total_tokens, 7);
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert_eq!(result.provider_metadata.unwrap()["session_id"], "s-1");
    }

    #[tokio::test]
    async fn generate_surfaces_error_chunk_as_err() {
        let driver = ScriptedDriver {
            chunks: vec![
                StreamChunk::TextDelta {
                    delta: "partial".to_string(),
                },
                StreamChunk::Error {
                    message: "upstream closed".to_string(),
                },
            ],
        };
        let err = driver.generate(ProviderRequest::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Stream(_)));
    }

    #[tokio::test]
    async fn scripted_stream_terminates_with_finish() {
        let driver = ScriptedDriver {
            chunks: vec![StreamChunk::Finish {
                reason: FinishReason::Stop,
                usage: None,
                provider_metadata: None,
            }],
        };
        let mut stream = driver
            .open_stream(ProviderRequest::default())
            .await
            .unwrap();
        let last = stream.next().await.unwrap().unwrap();
        assert!(last.is_terminal());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn driver_for_config_rejects_unknown_without_base_url() {
        let cfg = ProviderConfig::new("mystery", "m");
        assert!(driver_for_config(&cfg).is_err());

        let mut cfg = ProviderConfig::new("mystery", "m");
        cfg.base_url = Some("https://example.com/v1".to_string());
        assert!(driver_for_config(&cfg).is_ok());
    }
}
