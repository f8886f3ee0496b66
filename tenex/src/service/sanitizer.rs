//! Pre-flight message sanitizer.
//!
//! Two fixes run before every call: trailing assistant messages are stripped,
//! and empty-content user/assistant messages are removed. System messages are
//! never stripped, even when empty, and tool messages are never touched.
//! Each applied fix produces one warn-log line and one telemetry event; when
//! no fix applies the original params are returned by reference
//! (`Cow::Borrowed`), preserving identity.

use std::borrow::Cow;

use serde_json::json;

use crate::logging::WarnLog;
use crate::message::{Message, Role};

/// What kind of call the params belong to; recorded with each fix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallType {
    #[default]
    Chat,
    Completion,
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallType::Chat => f.write_str("chat"),
            CallType::Completion => f.write_str("completion"),
        }
    }
}

/// Parameters of one inference call, before provider conversion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionParams {
    /// System prompt kept apart from the message list.
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub call_type: CallType,
}

/// The fixes the sanitizer can apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixKind {
    TrailingAssistantStripped,
    EmptyMessagesRemoved,
}

impl FixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixKind::TrailingAssistantStripped => "trailing-assistant-stripped",
            FixKind::EmptyMessagesRemoved => "empty-messages-removed",
        }
    }
}

/// One message removed by a fix.
#[derive(Clone, Debug, PartialEq)]
pub struct RemovedMessage {
    pub index: usize,
    pub role: Role,
}

/// One applied fix, with the counts around it.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedFix {
    pub fix: FixKind,
    pub original_count: usize,
    pub fixed_count: usize,
    pub removed: Vec<RemovedMessage>,
}

/// Sanitizes the params. Returns the (possibly borrowed) params and the list
/// of applied fixes; an empty fix list guarantees `Cow::Borrowed`.
pub fn sanitize(params: &CompletionParams) -> (Cow<'_, CompletionParams>, Vec<AppliedFix>) {
    let mut fixes = Vec::new();
    let mut messages = params.messages.clone();

    // Fix 1: strip trailing assistant messages.
    let before = messages.len();
    let mut removed = Vec::new();
    while messages.last().map(|m| m.role) == Some(Role::Assistant) {
        let index = messages.len() - 1;
        messages.pop();
        removed.push(RemovedMessage {
            index,
            role: Role::Assistant,
        });
    }
    if !removed.is_empty() {
        fixes.push(AppliedFix {
            fix: FixKind::TrailingAssistantStripped,
            original_count: before,
            fixed_count: messages.len(),
            removed,
        });
    }

    // Fix 2: drop empty-content user/assistant messages. System messages are
    // kept even when empty; tool messages are never dropped.
    let before = messages.len();
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(messages.len());
    for (index, message) in messages.into_iter().enumerate() {
        let strippable = matches!(message.role, Role::User | Role::Assistant);
        if strippable && message.content_is_empty() {
            removed.push(RemovedMessage {
                index,
                role: message.role,
            });
        } else {
            kept.push(message);
        }
    }
    let messages = kept;
    if !removed.is_empty() {
        fixes.push(AppliedFix {
            fix: FixKind::EmptyMessagesRemoved,
            original_count: before,
            fixed_count: messages.len(),
            removed,
        });
    }

    if fixes.is_empty() {
        return (Cow::Borrowed(params), fixes);
    }
    (
        Cow::Owned(CompletionParams {
            system: params.system.clone(),
            messages,
            call_type: params.call_type,
        }),
        fixes,
    )
}

/// Sanitizes and records each applied fix: one JSONL warn-log line and one
/// telemetry span event per fix. A clean prompt writes nothing.
pub fn sanitize_and_log<'a>(
    params: &'a CompletionParams,
    model_label: &str,
    warn_log: Option<&WarnLog>,
) -> Cow<'a, CompletionParams> {
    let (sanitized, fixes) = sanitize(params);
    for fix in &fixes {
        let removed: Vec<_> = fix
            .removed
            .iter()
            .map(|r| json!({ "index": r.index, "role": r.role.to_string() }))
            .collect();
        tracing::warn!(
            target: "telemetry",
            event = "message-sanitizer.fix-applied",
            fix = fix.fix.as_str(),
            model = model_label,
            call_type = %params.call_type,
            original_count = fix.original_count,
            fixed_count = fix.fixed_count,
            "message sanitizer applied a fix"
        );
        if let Some(warn_log) = warn_log {
            let line = json!({
                "type": "message-sanitizer",
                "fix": fix.fix.as_str(),
                "model": model_label,
                "callType": params.call_type.to_string(),
                "original_count": fix.original_count,
                "fixed_count": fix.fixed_count,
                "removed": removed,
                "ts": chrono::Utc::now().to_rfc3339(),
            });
            if let Err(e) = warn_log.append(&line) {
                tracing::error!(error = %e, "failed to append sanitizer warn log");
            }
        }
    }
    sanitized
}
