//! Conversation interface consumed by the runtime.
//!
//! The core reads the root event id, the todo list, and the message history,
//! and records delegation markers; persistence belongs to the embedding
//! application. [`InMemoryConversation`] is the reference implementation used
//! by the runtime's own tests and by MCP-less embedding.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::message::{ContentPart, Message, MessageContent};

/// One entry of the caller-maintained per-conversation todo list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "pending".to_string()
}

/// Errors surfaced by a conversation backend.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("tool result references unknown call id: {0}")]
    UnknownCallId(String),
    #[error("save failed: {0}")]
    Save(String),
}

/// Read/append surface of one conversation aggregate.
///
/// The runtime holds `Arc<dyn Conversation>`; the delegation tools read
/// `todos()` (the delegation precondition) and call `add_delegation_marker`,
/// the mock matcher reads `history()`.
pub trait Conversation: Send + Sync {
    /// The event id at the root of this conversation thread.
    fn root_event_id(&self) -> String;

    /// Current todo list. Empty means delegation is rejected.
    fn todos(&self) -> Vec<TodoItem>;

    /// Records that a delegation with the given ledger handle was issued
    /// from this conversation.
    fn add_delegation_marker(&self, ral_number: u64);

    /// Full message history, oldest first.
    fn history(&self) -> Vec<Message>;

    /// Appends a message. Tool-result parts must reference a call id seen
    /// earlier in this conversation.
    fn push(&self, message: Message) -> Result<(), ConversationError>;

    /// Persists the conversation through the backing store.
    fn save(&self) -> Result<(), ConversationError>;
}

#[derive(Default)]
struct InMemoryState {
    messages: Vec<Message>,
    todos: Vec<TodoItem>,
    delegation_markers: Vec<u64>,
}

/// In-memory conversation with no persistence.
pub struct InMemoryConversation {
    root_event_id: String,
    state: Mutex<InMemoryState>,
}

impl InMemoryConversation {
    pub fn new(root_event_id: impl Into<String>) -> Self {
        Self {
            root_event_id: root_event_id.into(),
            state: Mutex::new(InMemoryState::default()),
        }
    }

    /// Replaces the todo list.
    pub fn set_todos(&self, todos: Vec<TodoItem>) {
        self.state.lock().unwrap().todos = todos;
    }

    /// Ledger handles recorded via `add_delegation_marker`, oldest first.
    pub fn delegation_markers(&self) -> Vec<u64> {
        self.state.lock().unwrap().delegation_markers.clone()
    }
}

impl Conversation for InMemoryConversation {
    fn root_event_id(&self) -> String {
        self.root_event_id.clone()
    }

    fn todos(&self) -> Vec<TodoItem> {
        self.state.lock().unwrap().todos.clone()
    }

    fn add_delegation_marker(&self, ral_number: u64) {
        self.state.lock().unwrap().delegation_markers.push(ral_number);
    }

    fn history(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    fn push(&self, message: Message) -> Result<(), ConversationError> {
        let mut state = self.state.lock().unwrap();
        if let MessageContent::Parts(parts) = &message.content {
            for part in parts {
                if let ContentPart::ToolResult { call_id, .. } = part {
                    let seen = state.messages.iter().any(|m| {
                        matches!(&m.content, MessageContent::Parts(ps) if ps.iter().any(|p| {
                            matches!(p, ContentPart::ToolCall { call_id: id, .. } if id == call_id)
                        }))
                    });
                    if !seen {
                        return Err(ConversationError::UnknownCallId(call_id.clone()));
                    }
                }
            }
        }
        state.messages.push(message);
        Ok(())
    }

    fn save(&self) -> Result<(), ConversationError> {
        Ok(())
    }
}
