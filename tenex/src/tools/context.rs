//! Per-invocation context passed to every tool.
//!
//! Carries the agent identity, the conversation (when one exists), the
//! sandbox roots for filesystem tools, the delegation ledger handle, and the
//! triggering network event whose nudge tags delegations inherit.

use std::path::PathBuf;
use std::sync::Arc;

use crate::conversation::Conversation;
use crate::nostr::NostrEvent;

/// Project the invocation runs under.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectRef {
    pub id: String,
    pub pubkey: String,
    pub title: String,
}

/// Context borrowed by tools for the duration of one execute call.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Public key of the agent issuing the call.
    pub agent_pubkey: String,
    /// Conversation id the call belongs to.
    pub conversation_id: String,
    /// The caller's working directory; filesystem tools are scoped to it.
    pub working_dir: PathBuf,
    /// Tenex base directory; the agent's personal home lives underneath.
    pub base_dir: PathBuf,
    /// Conversation aggregate, absent in MCP-only mode.
    pub conversation: Option<Arc<dyn Conversation>>,
    /// Delegation ledger handle for the current turn, when one exists.
    pub ral_number: Option<u64>,
    /// The network event that triggered this turn.
    pub triggering_event: Option<NostrEvent>,
    /// Project metadata, when the daemon runs project-scoped.
    pub project: Option<ProjectRef>,
}

impl ExecutionContext {
    /// Creates a context with the given identity and working directory.
    /// The base dir defaults to `.tenex` under the working directory.
    pub fn new(
        agent_pubkey: impl Into<String>,
        conversation_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let working_dir = working_dir.into();
        let base_dir = working_dir.join(".tenex");
        Self {
            agent_pubkey: agent_pubkey.into(),
            conversation_id: conversation_id.into(),
            working_dir,
            base_dir,
            conversation: None,
            ral_number: None,
            triggering_event: None,
            project: None,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_conversation(mut self, conversation: Arc<dyn Conversation>) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn with_ral_number(mut self, ral_number: u64) -> Self {
        self.ral_number = Some(ral_number);
        self
    }

    pub fn with_triggering_event(mut self, event: NostrEvent) -> Self {
        self.triggering_event = Some(event);
        self
    }

    pub fn with_project(mut self, project: ProjectRef) -> Self {
        self.project = Some(project);
        self
    }

    /// The agent's personal home directory, derived deterministically from
    /// the agent public key under the tenex base dir.
    pub fn agent_home(&self) -> PathBuf {
        self.base_dir.join("agents").join(&self.agent_pubkey)
    }

    /// Nudge ids inherited from the triggering event; empty without one.
    pub fn inherited_nudges(&self) -> Vec<String> {
        self.triggering_event
            .as_ref()
            .map(|e| e.nudge_tags())
            .unwrap_or_default()
    }
}
