// crates/core/src/parser.rs
//! Streaming JSONL parser for AI coding session transcripts.
//!
//! Handles malformed lines gracefully, extracts only conversation turns
//! and tool calls, and never fails the whole file over one bad line.

use crate::error::ParseError;
use rekal_types::{truncate_bytes, ActorKind, Role, ToolCallRecord};
use serde_json::Value;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// A turn produced by the parser, not yet attached to a session id.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurn {
    pub role: Role,
    pub text: String,
    /// Unix seconds; 0 when the record had no (or a malformed) timestamp.
    pub timestamp: i64,
}

/// A tool call produced by the parser, not yet attached to a session id.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub tool_name: String,
    pub file_path: Option<String>,
    pub command_prefix: Option<String>,
}

/// Everything extracted from one transcript file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSession {
    pub turns: Vec<ParsedTurn>,
    pub tool_calls: Vec<ParsedToolCall>,
    pub branch: String,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    /// Wall clock at parse end (unix seconds).
    pub captured_at: i64,
}

impl ParsedSession {
    /// Content with neither text nor tool calls produces zero output and
    /// the caller must drop the session.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.tool_calls.is_empty()
    }
}

/// Record types discarded outright regardless of content.
const FILTERED_TYPES: &[&str] = &["file-history-snapshot"];

/// Parse a transcript JSONL file into turns + tool calls.
///
/// Malformed JSON lines, and lines naming an unrecognized or filtered
/// `type`, are skipped with a debug log; the parse never fails because
/// of one bad line. Only I/O errors opening/reading the file are fatal.
pub async fn parse_session(file_path: &Path) -> Result<ParsedSession, ParseError> {
    let file = File::open(file_path)
        .await
        .map_err(|e| ParseError::io(file_path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut turns = Vec::new();
    let mut tool_calls = Vec::new();
    let mut branch = String::new();
    let mut actor = ActorKind::Human;
    let mut agent_id = None;
    let mut line_number = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::io(file_path, e))?
    {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(line = line_number, %e, "skipping malformed JSON line");
                continue;
            }
        };

        let entry_type = match value.get("type").and_then(Value::as_str) {
            Some(t) => t,
            None => {
                debug!(line = line_number, "skipping line with no type field");
                continue;
            }
        };

        if FILTERED_TYPES.contains(&entry_type) {
            continue;
        }
        if value.get("isSidechain").and_then(Value::as_bool) == Some(true) {
            continue;
        }

        if let Some(b) = value.get("gitBranch").and_then(Value::as_str) {
            if branch.is_empty() {
                branch = b.to_string();
            }
        }
        if let Some(id) = value.get("agentId").and_then(Value::as_str) {
            actor = ActorKind::Agent;
            agent_id = Some(id.to_string());
        }

        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0);

        let message = match value.get("message") {
            Some(m) => m,
            None => continue,
        };

        match entry_type {
            "user" => {
                if let Some(text) = extract_user_text(message) {
                    if !text.is_empty() {
                        turns.push(ParsedTurn {
                            role: Role::Human,
                            text,
                            timestamp,
                        });
                    }
                }
            }
            "assistant" => {
                let (text, mut calls) = extract_assistant_content(message);
                if let Some(text) = text {
                    if !text.is_empty() {
                        turns.push(ParsedTurn {
                            role: Role::Assistant,
                            text,
                            timestamp,
                        });
                    }
                }
                tool_calls.append(&mut calls);
            }
            _ => {
                debug!(line = line_number, entry_type, "skipping unrecognized type");
            }
        }
    }

    Ok(ParsedSession {
        turns,
        tool_calls,
        branch,
        actor,
        agent_id,
        captured_at: chrono::Utc::now().timestamp(),
    })
}

/// Extract the human turn's text from a user record's `message.content`.
/// Returns `None` if the content shape yields nothing (e.g. an
/// all-tool_result array), distinct from `Some("")`.
fn extract_user_text(message: &Value) -> Option<String> {
    let content = message.get("content")?;
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let texts = collect_text_blocks(blocks);
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Extract the assistant turn's text plus any tool calls from an
/// assistant record's `message.content`.
fn extract_assistant_content(message: &Value) -> (Option<String>, Vec<ParsedToolCall>) {
    let content = match message.get("content") {
        Some(c) => c,
        None => return (None, Vec::new()),
    };

    match content {
        Value::String(s) => (Some(s.clone()), Vec::new()),
        Value::Array(blocks) => {
            let texts = collect_text_blocks(blocks);
            let text = if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            };
            let calls = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                .filter_map(extract_tool_call)
                .collect();
            (text, calls)
        }
        _ => (None, Vec::new()),
    }
}

fn collect_text_blocks(blocks: &[Value]) -> Vec<String> {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn extract_tool_call(block: &Value) -> Option<ParsedToolCall> {
    let tool_name = block.get("name").and_then(Value::as_str)?.to_string();
    let input = block.get("input");

    let file_path = input.and_then(|i| {
        i.get("file_path")
            .or_else(|| i.get("path"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let command_prefix = input
        .and_then(|i| i.get("command"))
        .and_then(Value::as_str)
        .map(|c| truncate_bytes(c, ToolCallRecord::COMMAND_PREFIX_LIMIT));

    Some(ParsedToolCall {
        tool_name,
        file_path,
        command_prefix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut f = tokio::fs::File::create(file.path()).await.unwrap();
        for line in lines {
            f.write_all(line.as_bytes()).await.unwrap();
            f.write_all(b"\n").await.unwrap();
        }
        file
    }

    #[tokio::test]
    async fn parses_user_and_assistant_turns() {
        let file = write_transcript(&[
            r#"{"type":"user","timestamp":"2024-01-01T00:00:00Z","message":{"role":"user","content":"fix the bug"}}"#,
            r#"{"type":"assistant","timestamp":"2024-01-01T00:00:05Z","message":{"role":"assistant","content":[{"type":"text","text":"done"}]}}"#,
        ])
        .await;

        let parsed = parse_session(file.path()).await.unwrap();
        assert_eq!(parsed.turns.len(), 2);
        assert_eq!(parsed.turns[0].role, Role::Human);
        assert_eq!(parsed.turns[0].text, "fix the bug");
        assert_eq!(parsed.turns[1].role, Role::Assistant);
        assert_eq!(parsed.turns[1].timestamp, 1704067205);
    }

    #[tokio::test]
    async fn extracts_tool_calls_with_truncated_command() {
        let long_cmd = "x".repeat(200);
        let line = format!(
            r#"{{"type":"assistant","message":{{"content":[{{"type":"tool_use","name":"Bash","input":{{"command":"{long_cmd}"}}}}]}}}}"#
        );
        let file = write_transcript(&[&line]).await;

        let parsed = parse_session(file.path()).await.unwrap();
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].tool_name, "Bash");
        assert_eq!(
            parsed.tool_calls[0].command_prefix.as_ref().unwrap().len(),
            100
        );
    }

    #[tokio::test]
    async fn extracts_read_tool_file_path() {
        let file = write_transcript(&[
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"src/main.rs"}}]}}"#,
        ])
        .await;

        let parsed = parse_session(file.path()).await.unwrap();
        assert_eq!(
            parsed.tool_calls[0].file_path.as_deref(),
            Some("src/main.rs")
        );
    }

    #[tokio::test]
    async fn discards_filtered_and_malformed_lines() {
        let file = write_transcript(&[
            r#"not valid json at all"#,
            r#"{"type":"file-history-snapshot","message":{"content":"x"}}"#,
            r#"{"type":"user","isSidechain":true,"message":{"content":"hidden"}}"#,
            r#"{"type":"user","message":{"content":"visible"}}"#,
        ])
        .await;

        let parsed = parse_session(file.path()).await.unwrap();
        assert_eq!(parsed.turns.len(), 1);
        assert_eq!(parsed.turns[0].text, "visible");
    }

    #[tokio::test]
    async fn tool_result_only_content_yields_no_turn() {
        let file = write_transcript(&[
            r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"ok"}]}}"#,
        ])
        .await;

        let parsed = parse_session(file.path()).await.unwrap();
        assert!(parsed.turns.is_empty());
    }

    #[tokio::test]
    async fn empty_transcript_is_empty_session() {
        let file = write_transcript(&[]).await;
        let parsed = parse_session(file.path()).await.unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn missing_timestamp_yields_zero() {
        let file = write_transcript(&[r#"{"type":"user","message":{"content":"hi"}}"#]).await;
        let parsed = parse_session(file.path()).await.unwrap();
        assert_eq!(parsed.turns[0].timestamp, 0);
    }

    #[tokio::test]
    async fn malformed_timestamp_is_discarded_silently() {
        let file = write_transcript(&[
            r#"{"type":"user","timestamp":"not-a-date","message":{"content":"hi"}}"#,
        ])
        .await;
        let parsed = parse_session(file.path()).await.unwrap();
        assert_eq!(parsed.turns[0].timestamp, 0);
    }

    #[tokio::test]
    async fn missing_file_is_parse_error() {
        let result = parse_session(Path::new("/nonexistent/path.jsonl")).await;
        assert!(matches!(result, Err(ParseError::NotFound { .. })));
    }
}
