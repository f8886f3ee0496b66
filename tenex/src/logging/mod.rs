//! JSONL log sinks: the per-call LLM log and the sanitizer warn log.
//!
//! The call log writes one line per LLM call to
//! `<project>/.tenex/logs/llms/llm-calls-<YYYY-MM-DD>[-<agent>].jsonl`;
//! per-agent files use a filename-sanitized agent slug. The warn log appends
//! sanitizer fixes to `<base>/daemon/warn.log`. Both create their parent
//! directories lazily on first write, so a run with nothing to record leaves
//! no files behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filename-safe slug for an agent name: lowercase alphanumerics and dashes.
pub fn sanitize_agent_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// One request message as recorded in the call log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<Value>,
    pub content_length: usize,
}

/// Request half of a call record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedRequest {
    pub messages: Vec<LoggedMessage>,
    pub options: Value,
    pub message_count: usize,
    pub total_request_length: usize,
}

/// One recorded tool call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedToolCall {
    pub name: String,
    pub params: Value,
    pub params_length: usize,
}

/// Usage snapshot in the response half.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Response half of a call record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedResponse {
    pub content: String,
    pub content_length: usize,
    pub tool_calls: Vec<LoggedToolCall>,
    pub tool_call_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LoggedUsage>,
}

/// Error half of a failed call record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "type")]
    pub error_type: String,
}

/// One line of the LLM call log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCallRecord {
    pub timestamp: String,
    pub timestamp_ms: i64,
    pub request_id: String,
    pub duration_ms: u64,
    pub config_key: String,
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub request: LoggedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<LoggedResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LoggedError>,
    pub status: String,
}

/// Appends call records to dated JSONL files under
/// `<project>/.tenex/logs/llms`.
pub struct LlmCallLogger {
    dir: PathBuf,
}

impl LlmCallLogger {
    /// Creates a logger rooted at the project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: project_dir.as_ref().join(".tenex").join("logs").join("llms"),
        }
    }

    /// The log file for a date and optional agent.
    pub fn log_path(&self, date: chrono::NaiveDate, agent: Option<&str>) -> PathBuf {
        let name = match agent {
            Some(agent) => format!(
                "llm-calls-{}-{}.jsonl",
                date.format("%Y-%m-%d"),
                sanitize_agent_slug(agent)
            ),
            None => format!("llm-calls-{}.jsonl", date.format("%Y-%m-%d")),
        };
        self.dir.join(name)
    }

    /// Appends one record to today's file (and the per-agent file when the
    /// record names an agent).
    pub fn append(&self, record: &LlmCallRecord) -> std::io::Result<()> {
        let date = Utc::now().date_naive();
        append_jsonl(&self.log_path(date, None), record)?;
        if let Some(agent) = &record.agent_name {
            append_jsonl(&self.log_path(date, Some(agent)), record)?;
        }
        Ok(())
    }
}

/// Appends sanitizer fixes to `<base>/daemon/warn.log`.
#[derive(Clone)]
pub struct WarnLog {
    path: PathBuf,
}

impl WarnLog {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join("daemon").join("warn.log"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one JSON line. Parent directories are created on first write.
    pub fn append(&self, value: &Value) -> std::io::Result<()> {
        append_jsonl(&self.path, value)
    }
}

fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(value)?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_is_lowercase_alnum_and_dashes() {
        assert_eq!(sanitize_agent_slug("Code Reviewer"), "code-reviewer");
        assert_eq!(sanitize_agent_slug("a//b__c"), "a-b-c");
        assert_eq!(sanitize_agent_slug("--weird--"), "weird");
        assert_eq!(sanitize_agent_slug("plain"), "plain");
    }

    #[test]
    fn log_path_embeds_date_and_agent_slug() {
        let logger = LlmCallLogger::new("/project");
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(
            logger.log_path(date, None),
            PathBuf::from("/project/.tenex/logs/llms/llm-calls-2026-08-01.jsonl")
        );
        assert_eq!(
            logger.log_path(date, Some("Code Reviewer")),
            PathBuf::from("/project/.tenex/logs/llms/llm-calls-2026-08-01-code-reviewer.jsonl")
        );
    }

    #[test]
    fn append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let logger = LlmCallLogger::new(dir.path());
        let record = LlmCallRecord {
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            timestamp_ms: 1_784_000_000_000,
            request_id: "req-1".to_string(),
            duration_ms: 42,
            config_key: "agents".to_string(),
            config: json!({ "provider": "ollama", "model": "llama3" }),
            agent_name: Some("planner".to_string()),
            request: LoggedRequest {
                messages: vec![],
                options: json!({}),
                message_count: 0,
                total_request_length: 0,
            },
            response: None,
            error: None,
            status: "success".to_string(),
        };
        logger.append(&record).unwrap();
        logger.append(&record).unwrap();

        let date = Utc::now().date_naive();
        let main = std::fs::read_to_string(logger.log_path(date, None)).unwrap();
        assert_eq!(main.lines().count(), 2);
        let per_agent = std::fs::read_to_string(logger.log_path(date, Some("planner"))).unwrap();
        assert_eq!(per_agent.lines().count(), 2);
        let parsed: LlmCallRecord = serde_json::from_str(main.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.request_id, "req-1");
    }

    #[test]
    fn warn_log_creates_parents_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let warn = WarnLog::new(dir.path());
        assert!(!warn.path().exists());
        warn.append(&json!({ "type": "message-sanitizer" })).unwrap();
        assert!(warn.path().exists());
        let raw = std::fs::read_to_string(warn.path()).unwrap();
        assert!(raw.contains("message-sanitizer"));
    }
}
