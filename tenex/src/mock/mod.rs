//! Deterministic mock driver for tests.
//!
//! [`MockLlmDriver`] implements the same [`ProviderDriver`] contract as the
//! real backends, selecting a canned [`MockResponse`] by matching
//! [`TriggerPattern`]s against the request. Triggers are a conjunction of
//! optional predicates; among matching candidates the highest priority wins
//! and ties break by insertion order. An optional stream delay spaces the
//! emitted chunks for timing-sensitive tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde_json::{json, Value};

use stream_chunk::{FinishReason, LanguageModelUsage, StreamChunk};

use crate::message::{ContentPart, Message, MessageContent, Role};
use crate::provider::{ChunkStream, ProviderDriver, ProviderError, ProviderRequest};

/// String predicate used by trigger patterns.
#[derive(Clone, Debug)]
pub enum TextMatch {
    /// Exact equality.
    Exact(String),
    /// Substring containment.
    Contains(String),
    /// Regex match.
    Regex(Regex),
}

impl TextMatch {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TextMatch::Regex(Regex::new(pattern)?))
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => text == expected,
            TextMatch::Contains(needle) => text.contains(needle),
            TextMatch::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Facts extracted from one request, matched by trigger patterns.
#[derive(Clone, Debug, Default)]
pub struct MatchInput {
    pub system_prompt: String,
    pub user_message: String,
    pub all_text: String,
    pub agent_name: Option<String>,
    pub phase: Option<String>,
    pub previous_agent: Option<String>,
    pub iteration: Option<u32>,
    pub previous_tool_calls: Vec<String>,
}

impl MatchInput {
    /// Builds the match input from a provider request.
    pub fn from_request(request: &ProviderRequest) -> Self {
        let mut system_parts = Vec::new();
        if let Some(system) = &request.system {
            system_parts.push(system.clone());
        }
        let mut all_parts = Vec::new();
        let mut user_message = String::new();
        let mut previous_tool_calls = Vec::new();

        for message in &request.messages {
            let text = surface_text(message);
            if message.role == Role::System {
                system_parts.push(text.clone());
            }
            if message.role == Role::User && !text.is_empty() {
                user_message = text.clone();
            }
            previous_tool_calls.extend(message.tool_call_names().iter().map(|s| s.to_string()));
            all_parts.push(text);
        }

        let metadata = &request.options.metadata;
        Self {
            system_prompt: system_parts.join("\n"),
            user_message,
            all_text: all_parts.join("\n"),
            agent_name: request.options.agent_name.clone(),
            phase: metadata.get("phase").cloned(),
            previous_agent: metadata.get("previous_agent").cloned(),
            iteration: metadata.get("iteration").and_then(|s| s.parse().ok()),
            previous_tool_calls,
        }
    }
}

/// Message text as the matcher sees it: text parts plus tool-result outputs,
/// so `message_contains` triggers can react to prior tool results.
fn surface_text(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(s) => s.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ToolResult { output, .. } => Some(output.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

/// Conjunction of optional predicates over a request.
#[derive(Clone, Debug, Default)]
pub struct TriggerPattern {
    system_prompt: Option<TextMatch>,
    user_message: Option<TextMatch>,
    message_contains: Option<TextMatch>,
    agent_name: Option<String>,
    phase: Option<String>,
    previous_agent: Option<String>,
    iteration: Option<u32>,
    previous_tool_calls: Option<Vec<String>>,
}

impl TriggerPattern {
    /// Matches every request.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, m: TextMatch) -> Self {
        self.system_prompt = Some(m);
        self
    }

    pub fn with_user_message(mut self, m: TextMatch) -> Self {
        self.user_message = Some(m);
        self
    }

    pub fn with_message_contains(mut self, m: TextMatch) -> Self {
        self.message_contains = Some(m);
        self
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_previous_agent(mut self, agent: impl Into<String>) -> Self {
        self.previous_agent = Some(agent.into());
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_previous_tool_calls(mut self, tools: Vec<String>) -> Self {
        self.previous_tool_calls = Some(tools);
        self
    }

    /// True when every set predicate holds.
    pub fn matches(&self, input: &MatchInput) -> bool {
        if let Some(m) = &self.system_prompt {
            if !m.matches(&input.system_prompt) {
                return false;
            }
        }
        if let Some(m) = &self.user_message {
            if !m.matches(&input.user_message) {
                return false;
            }
        }
        if let Some(m) = &self.message_contains {
            if !m.matches(&input.all_text) {
                return false;
            }
        }
        if let Some(expected) = &self.agent_name {
            if input.agent_name.as_deref() != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(expected) = &self.phase {
            if input.phase.as_deref() != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(expected) = &self.previous_agent {
            if input.previous_agent.as_deref() != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(expected) = self.iteration {
            if input.iteration != Some(expected) {
                return false;
            }
        }
        if let Some(required) = &self.previous_tool_calls {
            if !required
                .iter()
                .all(|name| input.previous_tool_calls.contains(name))
            {
                return false;
            }
        }
        true
    }
}

/// One canned response.
#[derive(Clone, Debug)]
pub struct MockResponse {
    content: String,
    tool_calls: Vec<(String, Value)>,
    usage: Option<LanguageModelUsage>,
    priority: i32,
    stream_delay: Option<Duration>,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
            priority: 0,
            stream_delay: None,
        }
    }

    pub fn with_tool_call(mut self, name: impl Into<String>, input: Value) -> Self {
        self.tool_calls.push((name.into(), input));
        self
    }

    pub fn with_usage(mut self, usage: LanguageModelUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }
}

/// Trigger-matched deterministic driver; the sole substitute LLM for tests.
pub struct MockLlmDriver {
    entries: Vec<(TriggerPattern, MockResponse)>,
    default_response: MockResponse,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl Default for MockLlmDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmDriver {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default_response: MockResponse::text("Mock response"),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Registers a trigger/response pair. Insertion order breaks priority
    /// ties.
    pub fn with_response(mut self, trigger: TriggerPattern, response: MockResponse) -> Self {
        self.entries.push((trigger, response));
        self
    }

    /// Response used when no trigger matches.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Requests observed so far, for assertions.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Selects the matching response with maximum priority; ties break by
    /// insertion order.
    pub fn select(&self, input: &MatchInput) -> &MockResponse {
        let mut best: Option<&(TriggerPattern, MockResponse)> = None;
        for entry in &self.entries {
            if !entry.0.matches(input) {
                continue;
            }
            match best {
                Some(current) if current.1.priority >= entry.1.priority => {}
                _ => best = Some(entry),
            }
        }
        best.map(|(_, response)| response)
            .unwrap_or(&self.default_response)
    }

    fn build_chunks(response: &MockResponse) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        if !response.content.is_empty() {
            chunks.push(StreamChunk::TextDelta {
                delta: response.content.clone(),
            });
        }
        for (idx, (name, input)) in response.tool_calls.iter().enumerate() {
            let call_id = format!("mock-call-{}", idx + 1);
            chunks.push(StreamChunk::ToolInputAvailable {
                id: call_id.clone(),
                tool_name: name.clone(),
                input: input.clone(),
            });
            chunks.push(StreamChunk::ToolCall {
                call_id,
                tool_name: name.clone(),
                input: input.clone(),
            });
        }
        if let Some(usage) = &response.usage {
            chunks.push(StreamChunk::Usage(usage.clone()));
        }
        let reason = if response.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        // Usage rides its own chunk; attaching it to finish as well would
        // double-count in folds.
        chunks.push(StreamChunk::Finish {
            reason,
            usage: None,
            provider_metadata: Some(json!({ "mock": true })),
        });
        chunks
    }
}

#[async_trait]
impl ProviderDriver for MockLlmDriver {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let input = MatchInput::from_request(&request);
        let response = self.select(&input).clone();
        self.requests.lock().unwrap().push(request);

        let chunks = Self::build_chunks(&response);
        let items: Vec<Result<StreamChunk, ProviderError>> = chunks.into_iter().map(Ok).collect();
        match response.stream_delay {
            None => Ok(Box::pin(futures::stream::iter(items))),
            Some(delay) => Ok(Box::pin(futures::stream::iter(items).then(
                move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                },
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_user(text: &str) -> ProviderRequest {
        ProviderRequest {
            messages: vec![Message::system("You are helpful"), Message::user(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unmatched_request_gets_the_default_response() {
        let driver = MockLlmDriver::new();
        let result = driver.generate(request_with_user("anything")).await.unwrap();
        assert_eq!(result.text, "Mock response");
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn trigger_on_user_message_substring() {
        let driver = MockLlmDriver::new().with_response(
            TriggerPattern::any().with_user_message(TextMatch::Contains("weather".to_string())),
            MockResponse::text("It is sunny."),
        );
        let result = driver
            .generate(request_with_user("what's the weather?"))
            .await
            .unwrap();
        assert_eq!(result.text, "It is sunny.");
    }

    #[tokio::test]
    async fn highest_priority_wins() {
        let driver = MockLlmDriver::new()
            .with_response(TriggerPattern::any(), MockResponse::text("low").with_priority(1))
            .with_response(TriggerPattern::any(), MockResponse::text("high").with_priority(5))
            .with_response(TriggerPattern::any(), MockResponse::text("mid").with_priority(3));
        let result = driver.generate(request_with_user("x")).await.unwrap();
        assert_eq!(result.text, "high");
    }

    #[tokio::test]
    async fn priority_ties_break_by_insertion_order() {
        let driver = MockLlmDriver::new()
            .with_response(TriggerPattern::any(), MockResponse::text("first").with_priority(2))
            .with_response(TriggerPattern::any(), MockResponse::text("second").with_priority(2));
        let result = driver.generate(request_with_user("x")).await.unwrap();
        assert_eq!(result.text, "first");
    }

    #[tokio::test]
    async fn conjunction_requires_every_predicate() {
        let trigger = TriggerPattern::any()
            .with_agent_name("planner")
            .with_user_message(TextMatch::Contains("plan".to_string()));
        let driver = MockLlmDriver::new()
            .with_response(trigger, MockResponse::text("planning"));

        // User message matches but the agent name does not.
        let result = driver.generate(request_with_user("plan this")).await.unwrap();
        assert_eq!(result.text, "Mock response");

        let mut request = request_with_user("plan this");
        request.options.agent_name = Some("planner".to_string());
        let result = driver.generate(request).await.unwrap();
        assert_eq!(result.text, "planning");
    }

    #[tokio::test]
    async fn regex_trigger_on_system_prompt() {
        let driver = MockLlmDriver::new().with_response(
            TriggerPattern::any()
                .with_system_prompt(TextMatch::regex(r"helpful|harmless").unwrap()),
            MockResponse::text("matched"),
        );
        let result = driver.generate(request_with_user("x")).await.unwrap();
        assert_eq!(result.text, "matched");
    }

    #[tokio::test]
    async fn previous_tool_calls_are_a_subset_check() {
        use crate::message::ContentPart;

        let trigger = TriggerPattern::any()
            .with_previous_tool_calls(vec!["grep".to_string()]);
        let driver = MockLlmDriver::new()
            .with_response(trigger, MockResponse::text("saw grep"));

        let mut request = request_with_user("next");
        request.messages.push(Message::parts(
            Role::Assistant,
            vec![ContentPart::ToolCall {
                call_id: "c1".to_string(),
                name: "grep".to_string(),
                input: json!({}),
            }],
        ));
        let result = driver.generate(request).await.unwrap();
        assert_eq!(result.text, "saw grep");
    }

    #[tokio::test]
    async fn metadata_predicates_match_phase_and_iteration() {
        let driver = MockLlmDriver::new().with_response(
            TriggerPattern::any().with_phase("verify").with_iteration(2),
            MockResponse::text("verifying round two"),
        );

        let mut request = request_with_user("go");
        request
            .options
            .metadata
            .insert("phase".to_string(), "verify".to_string());
        request
            .options
            .metadata
            .insert("iteration".to_string(), "2".to_string());
        let result = driver.generate(request).await.unwrap();
        assert_eq!(result.text, "verifying round two");
    }

    #[tokio::test]
    async fn tool_call_response_finishes_with_tool_calls() {
        let driver = MockLlmDriver::new().with_response(
            TriggerPattern::any(),
            MockResponse::text("calling")
                .with_tool_call("grep", json!({ "pattern": "x" }))
                .with_usage(LanguageModelUsage {
                    input_tokens: 3,
                    output_tokens: 1,
                    total_tokens: 4,
                    ..Default::default()
                }),
        );
        let result = driver.generate(request_with_user("x")).await.unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].1, "grep");
        assert_eq!(result.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(result.usage.total_tokens, 4);
    }

    #[tokio::test]
    async fn stream_delay_spaces_the_chunks() {
        let driver = MockLlmDriver::new().with_default_response(
            MockResponse::text("slow").with_stream_delay(Duration::from_millis(5)),
        );
        let started = std::time::Instant::now();
        let result = driver.generate(request_with_user("x")).await.unwrap();
        assert_eq!(result.text, "slow");
        // Two chunks (text + finish), each delayed.
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
