//! Delegation ledger behavior over the public API: nudge propagation, the
//! todo precondition, and the response-count invariant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use tenex::conversation::{InMemoryConversation, TodoItem};
use tenex::nostr::{EventPublisher, NostrEvent, PublishError, NUDGE_TAG};
use tenex::ral::{ProjectInfo, ProjectsRegistry, RalError, RalRegistry, StaticAgentMap};
use tenex::tools::{CrossProjectDelegateTool, DelegateTool, ExecutionContext, Tool};

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

fn conversation_with_todos() -> Arc<InMemoryConversation> {
    let conv = Arc::new(InMemoryConversation::new("root-ev"));
    conv.set_todos(vec![TodoItem {
        id: "t1".to_string(),
        content: "break the work down".to_string(),
        status: "pending".to_string(),
    }]);
    conv
}

async fn wait_for_marker(conv: &InMemoryConversation) -> u64 {
    for _ in 0..200 {
        if let Some(&n) = conv.delegation_markers().first() {
            return n;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("no delegation marker recorded");
}

#[tokio::test]
async fn outbound_nudge_set_is_dedup_of_inherited_and_explicit() {
    let ral = Arc::new(RalRegistry::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let tool = DelegateTool::new(Arc::clone(&ral), publisher.clone());

    let conv = conversation_with_todos();
    let mut trigger = NostrEvent::default();
    trigger.push_tag(NUDGE_TAG, "N1");
    trigger.push_tag(NUDGE_TAG, "N2");
    let ctx = ExecutionContext::new("pk-agent", "conv-1", "/w")
        .with_conversation(conv.clone())
        .with_triggering_event(trigger);

    let run = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tool.execute(
                json!({
                    "recipients": ["pk-r"],
                    "request": "do it",
                    "nudges": ["N2", "N3"]
                }),
                &ctx,
            )
            .await
        })
    };

    let n = wait_for_marker(&conv).await;
    ral.record_response(n, "pk-r", json!("ok")).unwrap();
    run.await.unwrap().unwrap();

    // The ledger's combined nudge set.
    let snapshot = ral.get(n).unwrap();
    assert_eq!(snapshot.nudges.len(), 3);
    for id in ["N1", "N2", "N3"] {
        assert!(snapshot.nudges.contains(id));
    }

    // The outbound event carries the same set as tags.
    let events = publisher.events.lock().unwrap();
    let mut tags = events[0].nudge_tags();
    tags.sort();
    assert_eq!(tags, vec!["N1", "N2", "N3"]);
}

#[tokio::test]
async fn delegate_with_empty_todos_fails_with_the_todo_message() {
    let ral = Arc::new(RalRegistry::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let tool = DelegateTool::new(ral, publisher);

    let conv = Arc::new(InMemoryConversation::new("root-ev"));
    let ctx = ExecutionContext::new("pk-agent", "conv-1", "/w").with_conversation(conv);

    let err = tool
        .execute(json!({ "recipients": ["pk-r"], "request": "x" }), &ctx)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Delegation requires a todo list"));
    assert!(message.contains("todo_write()"));
}

fn cross_project_tool(
    ral: &Arc<RalRegistry>,
    publisher: &Arc<RecordingPublisher>,
) -> CrossProjectDelegateTool {
    let projects = ProjectsRegistry::new();
    projects.add_project(
        "proj-b",
        ProjectInfo {
            pubkey: "pk-proj".to_string(),
            title: "B".to_string(),
            agents: vec!["coder".to_string()],
        },
    );
    projects.set_runtime(
        "proj-b",
        Arc::new(StaticAgentMap::new(
            [("coder".to_string(), "pk-coder".to_string())]
                .into_iter()
                .collect(),
        )),
    );
    CrossProjectDelegateTool::new(
        Arc::clone(ral),
        publisher.clone(),
        Arc::new(projects),
    )
}

#[tokio::test]
async fn cross_project_without_conversation_succeeds() {
    let ral = Arc::new(RalRegistry::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let tool = cross_project_tool(&ral, &publisher);

    // MCP-only mode: no conversation, no todo list to consult.
    let ctx = ExecutionContext::new("pk-agent", "conv-1", "/w");
    let run = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tool.execute(
                json!({ "project_id": "proj-b", "agent": "coder", "request": "review" }),
                &ctx,
            )
            .await
        })
    };
    for _ in 0..200 {
        if ral.get(1).is_ok() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    ral.record_response(1, "pk-coder", json!("reviewed")).unwrap();

    let out = run.await.unwrap().unwrap();
    assert!(out.human.contains("reviewed"));
}

#[tokio::test]
async fn cross_project_with_conversation_and_empty_todos_fails() {
    let ral = Arc::new(RalRegistry::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let tool = cross_project_tool(&ral, &publisher);

    let conv = Arc::new(InMemoryConversation::new("root-ev"));
    let ctx = ExecutionContext::new("pk-agent", "conv-1", "/w").with_conversation(conv);
    let err = tool
        .execute(json!({ "project_id": "proj-b", "request": "review" }), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Delegation requires a todo list"));
    assert!(err.to_string().contains("todo_write()"));
}

#[tokio::test]
async fn received_responses_never_exceed_the_expectation() {
    let ral = RalRegistry::new();
    let n = ral.create("pk-a", "conv", "proj");
    ral.register_expectation(
        n,
        2,
        vec!["pk-1".to_string(), "pk-2".to_string()],
        Default::default(),
    )
    .unwrap();

    assert!(ral.record_response(n, "pk-1", json!(1)).is_ok());
    let snap = ral.get(n).unwrap();
    assert!(snap.received.len() <= snap.expected_responses.unwrap());

    assert!(ral.record_response(n, "pk-2", json!(2)).is_ok());
    let snap = ral.get(n).unwrap();
    assert_eq!(snap.received.len(), snap.expected_responses.unwrap());
    assert_eq!(snap.status, tenex::ral::DelegationStatus::Complete);

    // A third response is rejected outright.
    let err = ral.record_response(n, "pk-3", json!(3)).unwrap_err();
    assert!(matches!(err, RalError::Completed(_)));
    let snap = ral.get(n).unwrap();
    assert!(snap.received.len() <= snap.expected_responses.unwrap());
}
