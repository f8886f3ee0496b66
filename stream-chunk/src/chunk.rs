//! Typed fragments of a streaming model response.
//!
//! A stream is a sequence of [`StreamChunk`]s terminated by exactly one of
//! `Finish` or `Error`. Usage chunks, when emitted, appear before or together
//! with the finish chunk. [`StreamChunk::kind`] gives the coarse discriminant
//! used for boundary detection between runs of same-typed chunks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::usage::LanguageModelUsage;

/// One typed fragment of a streaming model response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamChunk {
    /// Incremental assistant text.
    TextDelta { delta: String },
    /// Incremental reasoning ("thinking") text.
    ReasoningDelta { delta: String },
    /// Marks the start of a reasoning run.
    ReasoningStart,
    /// Marks the end of a reasoning run.
    ReasoningEnd,
    /// A tool call's argument stream has opened.
    ToolInputStart { id: String, tool_name: String },
    /// Incremental raw argument text for an open tool call.
    ToolInputDelta { id: String, delta: String },
    /// A tool call's arguments are complete and parsed.
    ToolInputAvailable {
        id: String,
        tool_name: String,
        input: Value,
    },
    /// A fully-formed tool call ready for dispatch.
    ToolCall {
        call_id: String,
        tool_name: String,
        input: Value,
    },
    /// The result of an executed tool call, echoed into the stream.
    ToolResult {
        call_id: String,
        tool_name: String,
        output: String,
    },
    /// Token usage for the current step.
    Usage(LanguageModelUsage),
    /// Terminal error; the stream ends after this chunk.
    Error { message: String },
    /// Terminal completion; the stream ends after this chunk.
    ///
    /// `provider_metadata` carries backend-specific extras (e.g. a resumable
    /// session id) that the service may extract; unknown keys are ignored.
    Finish {
        reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<LanguageModelUsage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<Value>,
    },
}

impl StreamChunk {
    /// The coarse discriminant of this chunk, for boundary detection.
    pub fn kind(&self) -> ChunkKind {
        match self {
            StreamChunk::TextDelta { .. } => ChunkKind::TextDelta,
            StreamChunk::ReasoningDelta { .. } => ChunkKind::ReasoningDelta,
            StreamChunk::ReasoningStart => ChunkKind::ReasoningStart,
            StreamChunk::ReasoningEnd => ChunkKind::ReasoningEnd,
            StreamChunk::ToolInputStart { .. } => ChunkKind::ToolInputStart,
            StreamChunk::ToolInputDelta { .. } => ChunkKind::ToolInputDelta,
            StreamChunk::ToolInputAvailable { .. } => ChunkKind::ToolInputAvailable,
            StreamChunk::ToolCall { .. } => ChunkKind::ToolCall,
            StreamChunk::ToolResult { .. } => ChunkKind::ToolResult,
            StreamChunk::Usage(_) => ChunkKind::Usage,
            StreamChunk::Error { .. } => ChunkKind::Error,
            StreamChunk::Finish { .. } => ChunkKind::Finish,
        }
    }

    /// True for the two terminal chunk types.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamChunk::Finish { .. } | StreamChunk::Error { .. }
        )
    }
}

/// Coarse chunk discriminant. One value per [`StreamChunk`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    TextDelta,
    ReasoningDelta,
    ReasoningStart,
    ReasoningEnd,
    ToolInputStart,
    ToolInputDelta,
    ToolInputAvailable,
    ToolCall,
    ToolResult,
    Usage,
    Error,
    Finish,
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChunkKind::TextDelta => "text-delta",
            ChunkKind::ReasoningDelta => "reasoning-delta",
            ChunkKind::ReasoningStart => "reasoning-start",
            ChunkKind::ReasoningEnd => "reasoning-end",
            ChunkKind::ToolInputStart => "tool-input-start",
            ChunkKind::ToolInputDelta => "tool-input-delta",
            ChunkKind::ToolInputAvailable => "tool-input-available",
            ChunkKind::ToolCall => "tool-call",
            ChunkKind::ToolResult => "tool-result",
            ChunkKind::Usage => "usage",
            ChunkKind::Error => "error",
            ChunkKind::Finish => "finish",
        };
        f.write_str(s)
    }
}

/// Why a stream finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// Output token limit reached.
    Length,
    /// The model ended the step to call tools.
    ToolCalls,
    /// Content was filtered by the provider.
    ContentFilter,
    /// The stream terminated on an error.
    Error,
    /// Provider-specific reason not covered above.
    Other,
}

impl FinishReason {
    /// Maps a provider's finish-reason string onto the taxonomy.
    /// Unknown strings map to `Other`.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "tool_use" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            _ => FinishReason::Other,
        }
    }
}
