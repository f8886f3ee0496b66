//! `publish_as_user`: publish an event signed by the user's remote signer.
//!
//! The event is forwarded to the bunker with a synthetic explanation tag so
//! the signer can show the user what they are approving. After signing, the
//! tag is stripped locally, the event id is recomputed over the cleaned
//! payload, and the returned signature is verified against it. Connect and
//! sign are bounded by hard timeouts; millisecond timestamps are rejected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::nostr::{EventPublisher, NostrEvent, UserSigner, EXPLANATION_TAG};
use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

/// Tool name for user-signed publication.
pub const TOOL_PUBLISH_AS_USER: &str = "publish_as_user";

/// Hard timeout for the bunker connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard timeout for the sign request (the user may need to approve).
pub const SIGN_TIMEOUT: Duration = Duration::from_secs(120);

/// Timestamps at or above this value are milliseconds, not seconds.
const MS_TIMESTAMP_FLOOR: i64 = 1_000_000_000_000;

/// Publishes an event signed by the user via a NIP-46 bunker.
pub struct PublishAsUserTool {
    signer: Arc<dyn UserSigner>,
    publisher: Arc<dyn EventPublisher>,
}

impl PublishAsUserTool {
    pub fn new(signer: Arc<dyn UserSigner>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { signer, publisher }
    }
}

#[async_trait]
impl Tool for PublishAsUserTool {
    fn name(&self) -> &str {
        TOOL_PUBLISH_AS_USER
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_PUBLISH_AS_USER,
            "Publish an event signed by the user. The user's signer shows the \
             explanation before approving.",
            json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "Event content to publish."
                    },
                    "kind": {
                        "type": "integer",
                        "description": "Event kind. Defaults to 1."
                    },
                    "explanation": {
                        "type": "string",
                        "description": "Why this should be published; shown to the user."
                    }
                },
                "required": ["content", "explanation"]
            }),
        )
    }

    async fn execute(
        &self,
        input: Value,
        _ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let content = input
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("content"))?;
        let explanation = input
            .get("explanation")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("explanation"))?;
        let kind = input.get("kind").and_then(Value::as_u64).unwrap_or(1) as u32;

        let mut event = NostrEvent {
            created_at: chrono::Utc::now().timestamp(),
            kind,
            content: content.to_string(),
            ..Default::default()
        };
        event.push_tag(EXPLANATION_TAG, explanation);
        event.refresh_id();

        tokio::time::timeout(CONNECT_TIMEOUT, self.signer.connect())
            .await
            .map_err(|_| {
                ToolError::execution(TOOL_PUBLISH_AS_USER, "timed out connecting to the signer")
            })?
            .map_err(|e| ToolError::execution(TOOL_PUBLISH_AS_USER, e.to_string()))?;

        let mut signed = tokio::time::timeout(SIGN_TIMEOUT, self.signer.sign_event(event))
            .await
            .map_err(|_| {
                ToolError::execution(TOOL_PUBLISH_AS_USER, "timed out waiting for the signature")
            })?
            .map_err(|e| ToolError::execution(TOOL_PUBLISH_AS_USER, e.to_string()))?;

        if signed.created_at >= MS_TIMESTAMP_FLOOR {
            return Err(ToolError::execution(
                TOOL_PUBLISH_AS_USER,
                "signer returned a millisecond timestamp",
            ));
        }

        // Strip the explanation and re-derive the id over the cleaned payload.
        signed.strip_tag(EXPLANATION_TAG);
        signed.refresh_id();

        if !self.signer.verify(&signed) {
            return Err(ToolError::execution(
                TOOL_PUBLISH_AS_USER,
                "signature verification failed for the cleaned event",
            ));
        }

        let event_id = signed.id.clone();
        self.publisher
            .publish(signed)
            .await
            .map_err(|e| ToolError::execution(TOOL_PUBLISH_AS_USER, e.to_string()))?;

        Ok(
            ToolOutput::text(format!("Published event {}", event_id)).with_typed(json!({
                "event_id": event_id,
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nostr::{PublishError, SignerError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<NostrEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: NostrEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// Signer stub: signs over the event as received (the bunker also strips
    /// the explanation tag before signing, so verification is modeled as
    /// checking the cleaned payload).
    struct StubSigner {
        verify_ok: bool,
        timestamp_override: Option<i64>,
    }

    #[async_trait]
    impl UserSigner for StubSigner {
        async fn connect(&self) -> Result<(), SignerError> {
            Ok(())
        }

        async fn sign_event(&self, mut event: NostrEvent) -> Result<NostrEvent, SignerError> {
            event.pubkey = "pk-user".to_string();
            if let Some(ts) = self.timestamp_override {
                event.created_at = ts;
            }
            event.sig = "aa".repeat(64);
            event.refresh_id();
            Ok(event)
        }

        fn verify(&self, _event: &NostrEvent) -> bool {
            self.verify_ok
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("pk-agent", "conv", "/w")
    }

    #[tokio::test]
    async fn publishes_cleaned_event_without_explanation_tag() {
        let publisher = Arc::new(RecordingPublisher::default());
        let tool = PublishAsUserTool::new(
            Arc::new(StubSigner {
                verify_ok: true,
                timestamp_override: None,
            }),
            publisher.clone(),
        );

        let out = tool
            .execute(
                json!({ "content": "gm", "explanation": "say good morning" }),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(out.human.starts_with("Published event"));

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].tag_values(EXPLANATION_TAG).is_empty());
        // The id matches the cleaned payload.
        assert_eq!(events[0].id, events[0].compute_id());
    }

    #[tokio::test]
    async fn failed_verification_rejects_the_publication() {
        let publisher = Arc::new(RecordingPublisher::default());
        let tool = PublishAsUserTool::new(
            Arc::new(StubSigner {
                verify_ok: false,
                timestamp_override: None,
            }),
            publisher.clone(),
        );

        let err = tool
            .execute(json!({ "content": "gm", "explanation": "x" }), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("signature verification failed"));
        assert!(publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn millisecond_timestamp_is_rejected() {
        let publisher = Arc::new(RecordingPublisher::default());
        let tool = PublishAsUserTool::new(
            Arc::new(StubSigner {
                verify_ok: true,
                timestamp_override: Some(1_700_000_000_000),
            }),
            publisher.clone(),
        );

        let err = tool
            .execute(json!({ "content": "gm", "explanation": "x" }), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("millisecond timestamp"));
        assert!(publisher.events.lock().unwrap().is_empty());
    }
}
