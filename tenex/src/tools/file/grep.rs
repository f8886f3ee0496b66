//! Grep tool: regex content search under the sandbox with strict output
//! budgeting.
//!
//! Output is hard-capped at [`MAX_OUTPUT_BYTES`] in every mode. `content`
//! output that would exceed the cap falls back to a deduplicated list of
//! matching files; if even the list exceeds the cap it is bisected on line
//! count with a partial-truncation note. A scan-buffer overflow triggers the
//! same fallback with a distinct message prefix. Pagination (`head_limit`)
//! applies before the budget check. `files_with_matches` and `count` never
//! fall back.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use glob::Pattern;
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

use super::path::resolve_sandboxed;

/// Tool name for content search.
pub const TOOL_GREP: &str = "grep";

/// Hard cap on the returned string, in bytes, across all modes.
pub const MAX_OUTPUT_BYTES: usize = 50_000;

/// Scan-buffer cap; exceeding it forces the file-list fallback.
const MAX_SCAN_BYTES: usize = 10 * 1024 * 1024;

/// Wall-clock limit for one search.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum bytes per matched line before truncation (char-boundary safe).
const MAX_LINE_BYTES: usize = 2000;

const BUDGET_FALLBACK_PREFIX: &str = "Content output would exceed 50KB limit";
const BUFFER_FALLBACK_PREFIX: &str = "Output exceeded maximum buffer size";
const PARTIAL_LIST_NOTE: &str = "(Partial file list - output truncated)";

/// Content search under the working directory or the agent home.
pub struct GrepTool;

#[derive(Clone, Copy, PartialEq)]
enum OutputMode {
    Content,
    FilesWithMatches,
    Count,
}

impl OutputMode {
    fn parse(s: &str) -> Result<Self, ToolError> {
        match s {
            "content" => Ok(OutputMode::Content),
            "files_with_matches" => Ok(OutputMode::FilesWithMatches),
            "count" => Ok(OutputMode::Count),
            other => Err(ToolError::validation(
                "output_mode",
                format!("invalid value for output_mode: {}", other),
            )),
        }
    }
}

struct MatchLine {
    file: String,
    line_num: usize,
    text: String,
}

struct ScanOutcome {
    matches: Vec<MatchLine>,
    buffer_overflow: bool,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        TOOL_GREP
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_GREP,
            "Search file contents with a regular expression. Returns matching \
             lines (content mode), matching file paths, or per-file match counts. \
             Output is capped at 50KB.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regex pattern to search for."
                    },
                    "path": {
                        "type": "string",
                        "description": "Absolute directory to search. Defaults to the working directory."
                    },
                    "include": {
                        "type": "string",
                        "description": "File glob filter, e.g. '*.rs' or '*.{ts,tsx}'."
                    },
                    "output_mode": {
                        "type": "string",
                        "enum": ["content", "files_with_matches", "count"],
                        "description": "What to return. Defaults to content."
                    },
                    "head_limit": {
                        "type": "integer",
                        "description": "Return at most this many output lines. 0 means no limit."
                    },
                    "case_insensitive": {
                        "type": "boolean",
                        "description": "Case-insensitive matching."
                    },
                    "allow_outside_workdir": {
                        "type": "boolean",
                        "description": "Permit searching outside the working directory."
                    }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let pattern = input
            .get("pattern")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::missing_required("pattern"))?;
        let case_insensitive = input
            .get("case_insensitive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ToolError::validation("pattern", format!("invalid regex: {}", e)))?;

        let mode = match input.get("output_mode").and_then(Value::as_str) {
            Some(s) => OutputMode::parse(s)?,
            None => OutputMode::Content,
        };
        let head_limit = input
            .get("head_limit")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let allow_outside = input
            .get("allow_outside_workdir")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let root = match input.get("path").and_then(Value::as_str) {
            Some(raw) => resolve_sandboxed(raw, ctx, allow_outside)?,
            None => ctx.working_dir.clone(),
        };
        if !root.is_dir() {
            return Err(ToolError::validation(
                "path",
                format!("path is not a directory: {}", root.display()),
            ));
        }

        let include = input
            .get("include")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(build_include_patterns)
            .transpose()?;

        let outcome = tokio::task::spawn_blocking(move || scan(&root, &regex, include.as_deref()))
            .await
            .map_err(|e| ToolError::system(format!("grep task failed: {}", e)))??;

        let match_count = outcome.matches.len();
        let output = render(outcome, mode, head_limit);
        debug_assert!(output.len() <= MAX_OUTPUT_BYTES);
        Ok(ToolOutput::text(output).with_typed(json!({ "matches": match_count })))
    }
}

/// Walks the tree collecting matching lines. Stops early on timeout or when
/// the accumulated match text exceeds the scan-buffer cap.
fn scan(
    root: &PathBuf,
    regex: &regex::Regex,
    include: Option<&[Pattern]>,
) -> Result<ScanOutcome, ToolError> {
    let started = Instant::now();
    let mut matches = Vec::new();
    let mut accumulated = 0usize;
    let mut buffer_overflow = false;

    'walk: for entry in WalkDir::new(root).follow_links(false) {
        if started.elapsed() > SEARCH_TIMEOUT {
            return Err(ToolError::execution(
                TOOL_GREP,
                format!("grep timed out after {}s", SEARCH_TIMEOUT.as_secs()),
            ));
        }
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_path = entry.path();

        if let Some(patterns) = include {
            let fname = file_path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            if !patterns.iter().any(|p| p.matches(&fname)) {
                continue;
            }
        }

        let bytes = match std::fs::read(file_path) {
            Ok(b) => b,
            Err(_) => continue,
        };
        if bytes.contains(&0u8) {
            continue;
        }
        let content = String::from_utf8_lossy(&bytes);
        let file = file_path.to_string_lossy().into_owned();

        for (idx, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                let text = truncate_str(line, MAX_LINE_BYTES).to_string();
                accumulated += file.len() + text.len() + 16;
                matches.push(MatchLine {
                    file: file.clone(),
                    line_num: idx + 1,
                    text,
                });
                if accumulated > MAX_SCAN_BYTES {
                    buffer_overflow = true;
                    break 'walk;
                }
            }
        }
    }

    Ok(ScanOutcome {
        matches,
        buffer_overflow,
    })
}

/// Formats the scan outcome for the requested mode, applying pagination
/// before the budget check and the fallback chain after it.
fn render(outcome: ScanOutcome, mode: OutputMode, head_limit: usize) -> String {
    if outcome.matches.is_empty() && !outcome.buffer_overflow {
        return "No matches found".to_string();
    }

    match mode {
        OutputMode::FilesWithMatches => {
            let files = paginate(unique_files(&outcome.matches), head_limit);
            fit_to_budget(&files, MAX_OUTPUT_BYTES, PARTIAL_LIST_NOTE)
        }
        OutputMode::Count => {
            let counts = paginate(per_file_counts(&outcome.matches), head_limit);
            fit_to_budget(&counts, MAX_OUTPUT_BYTES, PARTIAL_LIST_NOTE)
        }
        OutputMode::Content => {
            let lines: Vec<String> = paginate(
                outcome
                    .matches
                    .iter()
                    .map(|m| format!("{}:{}:{}", m.file, m.line_num, m.text))
                    .collect(),
                head_limit,
            );
            let joined = lines.join("\n");
            if !outcome.buffer_overflow && joined.len() <= MAX_OUTPUT_BYTES {
                return joined;
            }

            // Fallback: deduplicated file list under the overflow banner.
            let prefix = if outcome.buffer_overflow {
                BUFFER_FALLBACK_PREFIX
            } else {
                BUDGET_FALLBACK_PREFIX
            };
            let header = format!("{}. Matching files:", prefix);
            let files = unique_files(&outcome.matches);
            let budget = MAX_OUTPUT_BYTES - header.len() - 1;
            let listing = fit_to_budget(&files, budget, PARTIAL_LIST_NOTE);
            format!("{}\n{}", header, listing)
        }
    }
}

fn unique_files(matches: &[MatchLine]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut files = Vec::new();
    for m in matches {
        if seen.insert(m.file.as_str()) {
            files.push(m.file.clone());
        }
    }
    files
}

fn per_file_counts(matches: &[MatchLine]) -> Vec<String> {
    let mut order = Vec::new();
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for m in matches {
        let entry = counts.entry(m.file.as_str()).or_insert(0);
        if *entry == 0 {
            order.push(m.file.as_str());
        }
        *entry += 1;
    }
    order
        .into_iter()
        .map(|f| format!("{}:{}", f, counts[f]))
        .collect()
}

fn paginate(lines: Vec<String>, head_limit: usize) -> Vec<String> {
    if head_limit == 0 || lines.len() <= head_limit {
        lines
    } else {
        lines.into_iter().take(head_limit).collect()
    }
}

/// Joins lines under the byte budget. When they do not fit, bisects on line
/// count to the largest prefix that fits with the note appended.
fn fit_to_budget(lines: &[String], budget: usize, note: &str) -> String {
    let full = lines.join("\n");
    if full.len() <= budget {
        return full;
    }

    let mut low = 0usize;
    let mut high = lines.len();
    while low < high {
        let mid = (low + high + 1) / 2;
        let candidate_len = lines[..mid].iter().map(|l| l.len() + 1).sum::<usize>() + note.len();
        if candidate_len <= budget {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    let mut out = lines[..low].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(note);
    out
}

/// Expands one level of brace alternatives: `"*.{ts,tsx}"` becomes
/// `["*.ts", "*.tsx"]`. Patterns without braces are returned as-is.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let (Some(start), Some(end)) = (pattern.find('{'), pattern.rfind('}')) {
        if start < end {
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];
            return pattern[start + 1..end]
                .split(',')
                .map(|alt| format!("{}{}{}", prefix, alt.trim(), suffix))
                .collect();
        }
    }
    vec![pattern.to_string()]
}

fn build_include_patterns(include: &str) -> Result<Vec<Pattern>, ToolError> {
    expand_braces(include)
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| ToolError::validation("include", format!("invalid glob: {}", e)))
        })
        .collect()
}

/// Truncates to at most `max_bytes` bytes, respecting UTF-8 boundaries.
fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
