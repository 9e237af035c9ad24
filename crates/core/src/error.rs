// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing a JSONL transcript.
///
/// Per-transcript parse failures are never fatal to the caller — the
/// checkpoint engine logs and skips the offending file. This enum exists
/// so the caller can tell "file unreadable" apart from "file readable but
/// produced nothing" without string-matching.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("transcript not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied reading transcript: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors from the git subprocess adapter. Fatal to the command invoking
/// them unless an earlier step already committed durable state.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git not found on PATH")]
    NotFound,

    #[error("not a git repository: {path}")]
    NotARepo { path: PathBuf },

    #[error("git {subcommand} failed: {stderr}")]
    CommandFailed { subcommand: String, stderr: String },

    #[error("git {subcommand} timed out")]
    Timeout { subcommand: String },

    #[error("io error spawning git: {0}")]
    Io(#[from] std::io::Error),

    #[error("git output was not valid utf-8")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err = ParseError::io("/tmp/x.jsonl", io_err);
        assert!(matches!(err, ParseError::NotFound { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = ParseError::io("/tmp/x.jsonl", io_err);
        assert!(matches!(err, ParseError::PermissionDenied { .. }));
    }

    #[test]
    fn git_error_display_is_short() {
        let err = GitError::CommandFailed {
            subcommand: "rev-parse".into(),
            stderr: "not a git repository".into(),
        };
        assert!(err.to_string().contains("rev-parse"));
    }
}
