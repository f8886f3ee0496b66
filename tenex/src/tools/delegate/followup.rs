//! `delegate_followup`: ask a clarifying question of agents that already
//! responded to an earlier delegation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::nostr::EventPublisher;
use crate::ral::RalRegistry;
use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

use super::run_delegation;

/// Tool name for delegation follow-ups.
pub const TOOL_DELEGATE_FOLLOWUP: &str = "delegate_followup";

/// Sends a follow-up question to the recipients of a prior delegation,
/// identified by its ledger handle. No todo precondition: the original
/// delegation already passed it.
pub struct DelegateFollowupTool {
    ral: Arc<RalRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl DelegateFollowupTool {
    pub fn new(ral: Arc<RalRegistry>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { ral, publisher }
    }
}

#[async_trait]
impl Tool for DelegateFollowupTool {
    fn name(&self) -> &str {
        TOOL_DELEGATE_FOLLOWUP
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_DELEGATE_FOLLOWUP,
            "Ask a clarifying follow-up question of the agents that responded \
             to an earlier delegation.",
            json!({
                "type": "object",
                "properties": {
                    "ral_number": {
                        "type": "integer",
                        "description": "Handle of the delegation to follow up on."
                    },
                    "question": {
                        "type": "string",
                        "description": "The clarifying question."
                    }
                },
                "required": ["ral_number", "question"]
            }),
        )
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let ral_number = input
            .get("ral_number")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::missing_required("ral_number"))?;
        let question = input
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("question"))?;

        let original = self
            .ral
            .get(ral_number)
            .map_err(|e| ToolError::execution(TOOL_DELEGATE_FOLLOWUP, e.to_string()))?;
        if original.recipients.is_empty() {
            return Err(ToolError::execution(
                TOOL_DELEGATE_FOLLOWUP,
                format!("delegation {} has no recipients", ral_number),
            ));
        }

        // Nudges on the original record propagate to the follow-up.
        let explicit: Vec<String> = original.nudges.iter().cloned().collect();
        run_delegation(
            &self.ral,
            &self.publisher,
            ctx,
            TOOL_DELEGATE_FOLLOWUP,
            original.recipients.clone(),
            question,
            explicit,
            None,
            original.project_id.clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::delegate::test_support::RecordingPublisher;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn followup_reuses_the_original_recipients_and_nudges() {
        let ral = Arc::new(RalRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());

        // A completed original delegation.
        let original = ral.create("pk-agent", "conv-1", "proj");
        let nudges: BTreeSet<String> = ["N1".to_string()].into_iter().collect();
        ral.register_expectation(original, 1, vec!["pk-r".to_string()], nudges)
            .unwrap();
        ral.record_response(original, "pk-r", json!("first answer"))
            .unwrap();

        let tool = DelegateFollowupTool::new(Arc::clone(&ral), publisher.clone());
        let ctx = ExecutionContext::new("pk-agent", "conv-1", "/w");

        let run = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tool.execute(
                    json!({ "ral_number": original, "question": "which file?" }),
                    &ctx,
                )
                .await
            })
        };
        tokio::task::yield_now().await;
        let followup = original + 1;
        for _ in 0..100 {
            if ral.get(followup).is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        ral.record_response(followup, "pk-r", json!("main.rs")).unwrap();

        let out = run.await.unwrap().unwrap();
        assert!(out.human.contains("main.rs"));

        let events = publisher.events.lock().unwrap();
        assert_eq!(events[0].tag_values("p"), vec!["pk-r"]);
        assert_eq!(events[0].nudge_tags(), vec!["N1"]);
    }

    #[tokio::test]
    async fn followup_on_unknown_handle_is_rejected() {
        let ral = Arc::new(RalRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let tool = DelegateFollowupTool::new(ral, publisher);
        let ctx = ExecutionContext::new("pk", "conv", "/w");

        let err = tool
            .execute(json!({ "ral_number": 404, "question": "?" }), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no delegation record"));
    }
}
