//! Typed per-call events emitted by the LLM service.
//!
//! The service publishes events over an mpsc channel of this tagged union; a
//! `chunk-type-change` event strictly precedes the first typed event of each
//! new chunk run, which is the hook renderers use to close one stream segment
//! and open the next.

use serde_json::Value;

use stream_chunk::{ChunkKind, FinishReason, LanguageModelUsage};

use crate::message::Message;
use crate::tools::ToolResultEnvelope;

/// One event in the lifecycle of a single inference call.
#[derive(Clone, Debug)]
pub enum ServiceEvent {
    /// Incremental assistant text.
    Content { delta: String },
    /// Incremental reasoning text.
    Reasoning { delta: String },
    /// A tool is about to run.
    ToolWillExecute {
        name: String,
        call_id: String,
        args: Value,
    },
    /// A tool finished; the envelope carries success or failure.
    ToolDidExecute {
        name: String,
        call_id: String,
        result: ToolResultEnvelope,
    },
    /// The chunk type changed; emitted before the first event of the new run.
    ChunkTypeChange { from: ChunkKind, to: ChunkKind },
    /// A provider session id was observed. At most once per call.
    SessionCaptured { session_id: String },
    /// Terminal success: the final message plus aggregated call facts.
    Complete {
        message: Message,
        steps: usize,
        usage: LanguageModelUsage,
        finish_reason: FinishReason,
    },
    /// Terminal failure.
    Error { message: String },
}
