//! Delegation tools: hand a sub-task to other agents over the event network
//! and accumulate their responses through the ledger.
//!
//! All delegation tools share one outbound path: allocate a ledger record,
//! register the expectation (recipients + combined nudge set), mark the
//! conversation, publish the delegation event, then suspend on
//! [`RalRegistry::wait`] until every recipient responded or the record
//! aborts. The nudge set on the outbound event is always
//! `dedup(inherited ∪ explicit)`.

mod crossproject;
mod delegate;
mod followup;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use crate::nostr::{EventPublisher, NostrEvent, NUDGE_TAG};
use crate::ral::{combine_nudges, RalError, RalRegistry, ResponseRecord};
use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::ToolOutput;

pub use crossproject::{CrossProjectDelegateTool, TOOL_DELEGATE_CROSSPROJECT};
pub use delegate::{DelegatePhaseTool, DelegateTool, TOOL_DELEGATE, TOOL_DELEGATE_PHASE};
pub use followup::{DelegateFollowupTool, TOOL_DELEGATE_FOLLOWUP};

/// Name of the external-delegation variant (same implementation as the
/// cross-project tool, registered for daemons that expose it as such).
pub const TOOL_DELEGATE_EXTERNAL: &str = "delegate_external";

/// Event kind for delegation requests on the network.
pub const DELEGATION_EVENT_KIND: u32 = 1934;

/// The delegation family inspected by the service's follow-up hook.
pub const DELEGATION_TOOL_NAMES: [&str; 4] = [
    TOOL_DELEGATE,
    TOOL_DELEGATE_PHASE,
    TOOL_DELEGATE_EXTERNAL,
    TOOL_DELEGATE_FOLLOWUP,
];

/// True when the name belongs to the delegation family.
pub fn is_delegation_tool(name: &str) -> bool {
    DELEGATION_TOOL_NAMES.contains(&name)
}

/// Error raised when the conversation has no todo list.
fn todos_required(tool: &str) -> ToolError {
    ToolError::execution(
        tool,
        "Delegation requires a todo list. Create one with todo_write() before delegating.",
    )
}

/// Enforces the todo precondition against a conversation.
fn enforce_todos(ctx: &ExecutionContext, tool: &str) -> Result<(), ToolError> {
    match &ctx.conversation {
        Some(conversation) if conversation.todos().is_empty() => Err(todos_required(tool)),
        Some(_) => Ok(()),
        None => Err(ToolError::execution(
            tool,
            format!("{} requires an active conversation", tool),
        )),
    }
}

/// Builds the outbound delegation event.
fn build_delegation_event(
    ctx: &ExecutionContext,
    recipients: &[String],
    content: &str,
    nudges: &BTreeSet<String>,
    phase: Option<&str>,
) -> NostrEvent {
    let mut event = NostrEvent {
        pubkey: ctx.agent_pubkey.clone(),
        created_at: chrono::Utc::now().timestamp(),
        kind: DELEGATION_EVENT_KIND,
        content: content.to_string(),
        ..Default::default()
    };
    for recipient in recipients {
        event.push_tag("p", recipient);
    }
    if let Some(conversation) = &ctx.conversation {
        event.push_tag("E", &conversation.root_event_id());
    }
    for nudge in nudges {
        event.push_tag(NUDGE_TAG, nudge);
    }
    if let Some(phase) = phase {
        event.push_tag("phase", phase);
    }
    event.refresh_id();
    event
}

/// Shared delegation pipeline: ledger record, expectation, marker, publish,
/// wait. `project_id` names the target project for the ledger key.
pub(crate) async fn run_delegation(
    ral: &RalRegistry,
    publisher: &Arc<dyn EventPublisher>,
    ctx: &ExecutionContext,
    tool: &str,
    recipients: Vec<String>,
    content: &str,
    explicit_nudges: Vec<String>,
    phase: Option<&str>,
    project_id: String,
) -> Result<ToolOutput, ToolError> {
    if recipients.is_empty() {
        return Err(ToolError::validation(
            "recipients",
            "at least one recipient is required",
        ));
    }

    let nudges = combine_nudges(ctx.inherited_nudges(), explicit_nudges);
    let ral_number = ral.create(&ctx.agent_pubkey, &ctx.conversation_id, &project_id);
    ral.register_expectation(ral_number, recipients.len(), recipients.clone(), nudges.clone())
        .map_err(|e| ToolError::system(e.to_string()))?;

    if let Some(conversation) = &ctx.conversation {
        conversation.add_delegation_marker(ral_number);
    }

    let event = build_delegation_event(ctx, &recipients, content, &nudges, phase);
    tracing::debug!(
        ral_number,
        recipients = recipients.len(),
        nudges = nudges.len(),
        "publishing delegation"
    );
    publisher
        .publish(event)
        .await
        .map_err(|e| ToolError::execution(tool, format!("failed to publish delegation: {}", e)))?;

    let responses = match ral.wait(ral_number).await {
        Ok(responses) => responses,
        Err(RalError::Aborted { reason, .. }) => {
            return Err(ToolError::execution(
                tool,
                format!("delegation aborted: {}", reason),
            ))
        }
        Err(e) => return Err(ToolError::system(e.to_string())),
    };

    Ok(render_responses(ral_number, &responses))
}

fn render_responses(ral_number: u64, responses: &[ResponseRecord]) -> ToolOutput {
    let mut lines = vec![format!("Received {} response(s):", responses.len())];
    for response in responses {
        let text = response
            .payload
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| response.payload.to_string());
        lines.push(format!("- {}: {}", response.from_pubkey, text));
    }
    let typed = json!({
        "ral_number": ral_number,
        "responses": responses
            .iter()
            .map(|r| json!({ "from": r.from_pubkey, "payload": r.payload }))
            .collect::<Vec<_>>(),
    });
    ToolOutput::text(lines.join("\n")).with_typed(typed)
}
