//! Stream chunk protocol shared by provider adapters and the LLM service.
//!
//! Every provider backend normalizes its wire format into [`StreamChunk`]; the
//! service consumes chunks, detects type boundaries via [`ChunkKind`], and
//! aggregates [`LanguageModelUsage`] across steps.

mod chunk;
mod usage;

pub use chunk::{ChunkKind, FinishReason, StreamChunk};
pub use usage::LanguageModelUsage;
