//! Centralized path functions for Rekal's on-disk locations.
//!
//! Single source of truth — eliminates ad-hoc `dirs::home_dir().join(...)`
//! scattered across crates.

use std::path::{Path, PathBuf};

/// Repo-relative data directory: `.rekal/`.
pub const REKAL_DIR: &str = ".rekal";

/// Authoritative data store file name within `.rekal/`.
pub const DATA_DB_FILE: &str = "data.db";

/// Derived index store file name within `.rekal/`.
pub const INDEX_DB_FILE: &str = "index.db";

pub fn rekal_dir(git_root: &Path) -> PathBuf {
    git_root.join(REKAL_DIR)
}

pub fn data_db_path(git_root: &Path) -> PathBuf {
    rekal_dir(git_root).join(DATA_DB_FILE)
}

pub fn index_db_path(git_root: &Path) -> PathBuf {
    rekal_dir(git_root).join(INDEX_DB_FILE)
}

/// Sanitize an absolute repo path into the directory name the AI host
/// uses under `~/.claude/projects/`: every non-alphanumeric code point
/// becomes `-`.
pub fn sanitize_repo_path(repo_path: &str) -> String {
    repo_path
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

/// The directory the AI host writes JSONL transcripts to for a given repo.
///
/// `$HOME/.claude/projects/<sanitized-repo-path>/`
pub fn transcript_discovery_dir(home: &Path, repo_path: &str) -> PathBuf {
    home.join(".claude")
        .join("projects")
        .join(sanitize_repo_path(repo_path))
}

/// `$HOME/.local/bin/rekal` — fallback location hooks look for the binary
/// when it isn't on PATH.
pub fn fallback_binary_path(home: &Path) -> PathBuf {
    home.join(".local").join("bin").join("rekal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_every_non_alphanumeric() {
        assert_eq!(sanitize_repo_path("/Users/foo/my-project"), "-Users-foo-my-project");
        assert_eq!(sanitize_repo_path("C:\\work\\repo.git"), "C--work-repo-git");
    }

    #[test]
    fn sanitize_is_deterministic() {
        let p = "/home/dev/a_b.c (d)";
        assert_eq!(sanitize_repo_path(p), sanitize_repo_path(p));
    }

    #[test]
    fn transcript_discovery_dir_joins_sanitized_segment() {
        let home = PathBuf::from("/home/dev");
        let dir = transcript_discovery_dir(&home, "/home/dev/proj");
        assert_eq!(dir, PathBuf::from("/home/dev/.claude/projects/-home-dev-proj"));
    }

    #[test]
    fn data_and_index_db_paths_live_under_rekal_dir() {
        let root = PathBuf::from("/repo");
        assert_eq!(data_db_path(&root), PathBuf::from("/repo/.rekal/data.db"));
        assert_eq!(index_db_path(&root), PathBuf::from("/repo/.rekal/index.db"));
    }
}
