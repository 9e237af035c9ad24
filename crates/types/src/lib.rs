//! Shared domain types for Rekal's session ledger.
//!
//! These mirror the data model in the system spec: `Session`, `Turn`,
//! `ToolCall`, `Checkpoint`, `FileTouched`, and the small enums used at
//! both the storage layer and the wire layer.

pub mod ids;

use serde::{Deserialize, Serialize};

/// Who owns a session: a human typing directly, or an automated agent.
/// Independent of the per-turn [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Human,
    Agent,
}

impl ActorKind {
    pub fn as_byte(self) -> u8 {
        match self {
            ActorKind::Human => 0,
            ActorKind::Agent => 1,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => ActorKind::Agent,
            _ => ActorKind::Human,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::Human => "human",
            ActorKind::Agent => "agent",
        }
    }
}

/// Speaker of a single turn within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn as_byte(self) -> u8 {
        match self {
            Role::Human => 0,
            Role::Assistant => 1,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Role::Assistant,
            _ => Role::Human,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
        }
    }
}

/// Kind of change a file-touched row records. `T` marks a path derived
/// from a write-class tool call rather than the git diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    ToolDerived,
}

impl ChangeKind {
    pub fn as_byte(self) -> u8 {
        match self {
            ChangeKind::Added => b'A',
            ChangeKind::Modified => b'M',
            ChangeKind::Deleted => b'D',
            ChangeKind::Renamed => b'R',
            ChangeKind::ToolDerived => b'T',
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            b'A' => ChangeKind::Added,
            b'D' => ChangeKind::Deleted,
            b'R' => ChangeKind::Renamed,
            b'T' => ChangeKind::ToolDerived,
            _ => ChangeKind::Modified,
        }
    }

    /// Parse a `git diff --name-status` single-letter status code.
    /// Renames/copies (`R100`, `C75`, ...) collapse to the bare letter.
    pub fn from_git_status(status: &str) -> Self {
        match status.as_bytes().first() {
            Some(b'A') => ChangeKind::Added,
            Some(b'D') => ChangeKind::Deleted,
            Some(b'R') | Some(b'C') => ChangeKind::Renamed,
            _ => ChangeKind::Modified,
        }
    }
}

/// Wire-layer tool enumeration. Storage keeps tool names as free strings;
/// only the wire codec needs a stable numeric encoding. New codes are
/// additions — decoding an unrecognized byte must map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCode {
    Write,
    Read,
    Bash,
    Edit,
    Glob,
    Grep,
    Task,
    Unknown,
}

impl ToolCode {
    pub fn as_byte(self) -> u8 {
        match self {
            ToolCode::Write => 0x00,
            ToolCode::Read => 0x01,
            ToolCode::Bash => 0x02,
            ToolCode::Edit => 0x03,
            ToolCode::Glob => 0x04,
            ToolCode::Grep => 0x05,
            ToolCode::Task => 0x06,
            ToolCode::Unknown => 0xFF,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => ToolCode::Write,
            0x01 => ToolCode::Read,
            0x02 => ToolCode::Bash,
            0x03 => ToolCode::Edit,
            0x04 => ToolCode::Glob,
            0x05 => ToolCode::Grep,
            0x06 => ToolCode::Task,
            _ => ToolCode::Unknown,
        }
    }

    /// Map a free-form tool name (as seen in a transcript) to its wire code.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Write" => ToolCode::Write,
            "Read" => ToolCode::Read,
            "Bash" => ToolCode::Bash,
            "Edit" | "NotebookEdit" => ToolCode::Edit,
            "Glob" => ToolCode::Glob,
            "Grep" => ToolCode::Grep,
            "Task" => ToolCode::Task,
            _ => ToolCode::Unknown,
        }
    }

    /// Whether this tool is one whose path argument should be treated as
    /// a file the session actually wrote to (used to derive supplemental
    /// file-touched rows when a git diff doesn't cover uncommitted edits).
    pub fn is_write_class(self) -> bool {
        matches!(self, ToolCode::Write | ToolCode::Edit)
    }

    /// Reverse of [`ToolCode::from_name`]. Lossy for the names that
    /// collapse onto the same code (`Edit` and `NotebookEdit` both decode
    /// back to `"Edit"`) — an accepted cost of the compact wire encoding.
    pub fn canonical_name(self) -> &'static str {
        match self {
            ToolCode::Write => "Write",
            ToolCode::Read => "Read",
            ToolCode::Bash => "Bash",
            ToolCode::Edit => "Edit",
            ToolCode::Glob => "Glob",
            ToolCode::Grep => "Grep",
            ToolCode::Task => "Task",
            ToolCode::Unknown => "Unknown",
        }
    }
}

/// One captured AI transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// 64-character hex SHA-256 of the raw transcript file. The dedup key.
    pub content_hash: String,
    pub captured_at: i64,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub author_email: String,
    pub branch: String,
}

/// One conversation turn within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    /// 0-based, dense within the session.
    pub index: u32,
    pub role: Role,
    pub text: String,
    pub timestamp: Option<i64>,
}

/// One tool invocation emitted by an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub session_id: String,
    /// 0-based, dense within the session.
    pub order: u32,
    pub tool_name: String,
    pub file_path: Option<String>,
    /// First 100 bytes of a Bash-like command, if any.
    pub command_prefix: Option<String>,
}

impl ToolCallRecord {
    pub const COMMAND_PREFIX_LIMIT: usize = 100;

    pub fn truncate_command(command: &str) -> String {
        truncate_bytes(command, Self::COMMAND_PREFIX_LIMIT)
    }
}

/// Truncate a string to at most `max_bytes` bytes, respecting UTF-8 char
/// boundaries (never splits a multi-byte codepoint).
pub fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// An anchor between the session ledger and the host git repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    /// 40-char git commit hash of the host branch at anchor time.
    pub commit_sha: String,
    pub branch: String,
    pub author_email: String,
    pub timestamp: i64,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub exported: bool,
}

/// A file associated with a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTouched {
    pub checkpoint_id: String,
    /// Git-root-relative path.
    pub path: String,
    pub change_kind: ChangeKind,
}

/// Per (session, file path) cached state used to skip reparsing an
/// unchanged transcript file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub file_path: String,
    pub size: u64,
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_code_round_trips_through_byte() {
        for code in [
            ToolCode::Write,
            ToolCode::Read,
            ToolCode::Bash,
            ToolCode::Edit,
            ToolCode::Glob,
            ToolCode::Grep,
            ToolCode::Task,
            ToolCode::Unknown,
        ] {
            assert_eq!(ToolCode::from_byte(code.as_byte()), code);
        }
    }

    #[test]
    fn unknown_tool_code_byte_maps_to_sentinel() {
        assert_eq!(ToolCode::from_byte(0x42), ToolCode::Unknown);
    }

    #[test]
    fn tool_code_from_name_recognizes_known_tools() {
        assert_eq!(ToolCode::from_name("Bash"), ToolCode::Bash);
        assert_eq!(ToolCode::from_name("NotebookEdit"), ToolCode::Edit);
        assert_eq!(ToolCode::from_name("WebFetch"), ToolCode::Unknown);
    }

    #[test]
    fn change_kind_from_git_status_collapses_rename_scores() {
        assert_eq!(ChangeKind::from_git_status("R100"), ChangeKind::Renamed);
        assert_eq!(ChangeKind::from_git_status("C75"), ChangeKind::Renamed);
        assert_eq!(ChangeKind::from_git_status("A"), ChangeKind::Added);
    }

    #[test]
    fn truncate_bytes_respects_char_boundaries() {
        let s = "héllo wörld"; // contains multi-byte chars
        let truncated = truncate_bytes(s, 3);
        assert!(truncated.len() <= 3);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }
}
