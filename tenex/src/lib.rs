//! # Tenex core runtime
//!
//! A multi-agent orchestration runtime that drives LLM agents through
//! tool-using, streaming conversations and lets them delegate sub-tasks to
//! other agents over a decentralized event network.
//!
//! ## Components
//!
//! - **Provider adapters** ([`provider`]): uniform streaming drivers over
//!   concrete backends ([`HttpProvider`], [`OpenRouterProvider`],
//!   [`OllamaProvider`], [`ClaudeCodeProvider`]); reasoning extraction and
//!   cache-control middleware.
//! - **Tool plane** ([`tools`]): the [`Tool`] trait, input normalization and
//!   schema validation, the [`ToolResultEnvelope`], sandboxed filesystem
//!   tools ([`ReadFileTool`], [`WriteFileTool`], [`GrepTool`]), the
//!   delegation family, and [`PublishAsUserTool`].
//! - **LLM service** ([`service`]): drives one inference call end-to-end —
//!   sanitizer, step budget, typed [`ServiceEvent`]s with
//!   `chunk-type-change` boundaries, mid-stream tool execution, usage
//!   finalization, and the flight recorder gated by [`RecordingState`].
//! - **Router** ([`router`]): resolves config names and role defaults to
//!   concrete provider configs; atomic reload; agent-scoped wrapping.
//! - **Delegation ledger** ([`ral`]): the [`RalRegistry`] of outstanding
//!   delegations keyed by integer handles, nudge propagation, and
//!   cross-project resolution ([`ProjectsRegistry`]).
//! - **Mock driver** ([`mock`]): trigger-matched deterministic responses,
//!   implementing the same [`ProviderDriver`] contract as the real backends.
//!
//! Wire-level chunk types live in the `stream-chunk` crate; model specs in
//! `model-spec-core`; configuration loading in the `config` crate.

pub mod conversation;
pub mod logging;
pub mod message;
pub mod mock;
pub mod model_spec;
pub mod nostr;
pub mod provider;
pub mod ral;
pub mod router;
pub mod service;
pub mod tools;

pub use conversation::{Conversation, ConversationError, InMemoryConversation, TodoItem};
pub use logging::{sanitize_agent_slug, LlmCallLogger, LlmCallRecord, WarnLog};
pub use message::{CacheControl, ContentPart, Message, MessageContent, Role};
pub use mock::{MatchInput, MockLlmDriver, MockResponse, TextMatch, TriggerPattern};
pub use model_spec::{
    CachedResolver, ModelSpec, ModelSpecResolver, ModelsDevResolver, SpecRefresher,
};
pub use nostr::{
    EventPublisher, NostrEvent, PublishError, SignerError, UserSigner, EXPLANATION_TAG, NUDGE_TAG,
};
pub use provider::{
    apply_cache_control, compile_system_prompts, driver_for_config, extract_reasoning,
    ChunkStream, ClaudeCodeProvider, FinalResult, HttpProvider, OllamaProvider,
    OpenRouterProvider, ProviderDriver, ProviderError, ProviderRequest, RequestOptions,
    ToolDefinition,
};
pub use ral::{
    combine_nudges, DelegationSnapshot, DelegationStatus, ProjectInfo, ProjectsRegistry,
    RalError, RalRegistry, ResponseRecord,
};
pub use router::{AgentScopedRouter, ResolveContext, ResolvedConfig, Router, RouterError};
pub use service::{
    sanitize, sanitize_and_log, CallType, Completion, CompletionParams, InvalidToolCall,
    LlmService, RecordingState, ServiceError, ServiceEvent, MAX_STEPS,
};
pub use tools::{
    is_delegation_tool, CrossProjectDelegateTool, DelegateFollowupTool, DelegatePhaseTool,
    DelegateTool, ExecutionContext, GrepTool, ProjectRef, PublishAsUserTool, ReadFileTool,
    Tool, ToolError, ToolOutput, ToolRegistry, ToolResultEnvelope, ToolSpec, WriteFileTool,
    TOOL_DELEGATE, TOOL_DELEGATE_CROSSPROJECT, TOOL_DELEGATE_FOLLOWUP, TOOL_DELEGATE_PHASE,
    TOOL_GREP, TOOL_PUBLISH_AS_USER, TOOL_READ_FILE, TOOL_WRITE_FILE,
};

pub use stream_chunk::{ChunkKind, FinishReason, LanguageModelUsage, StreamChunk};
