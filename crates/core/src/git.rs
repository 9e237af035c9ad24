// crates/core/src/git.rs
//! Thin async adapter over the `git` executable.
//!
//! Every call shells out rather than linking libgit2: the wire format and
//! branch layout this tool depends on (orphan branches, exactly-two-blob
//! trees, `update-ref`) are a handful of plumbing commands, and shelling
//! out means the on-disk git version is whatever the user already has.

use crate::error::GitError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const GIT_TIMEOUT: Duration = Duration::from_secs(15);

/// One entry from `diff --name-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    /// Raw status code, e.g. `"M"`, `"A"`, `"D"`, `"R100"`.
    pub status: String,
}

async fn run(repo: &Path, args: &[&str]) -> Result<std::process::Output, GitError> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(repo)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|_| GitError::NotFound)?;
    let output = tokio::time::timeout(GIT_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| GitError::Timeout {
            subcommand: args.first().unwrap_or(&"").to_string(),
        })??;

    Ok(output)
}

fn stdout_str(output: &std::process::Output) -> Result<String, GitError> {
    String::from_utf8(output.stdout.clone()).map_err(|_| GitError::InvalidUtf8)
}

fn require_success(args: &[&str], output: std::process::Output) -> Result<String, GitError> {
    if !output.status.success() {
        return Err(GitError::CommandFailed {
            subcommand: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    stdout_str(&output).map(|s| s.trim().to_string())
}

/// `git rev-parse --show-toplevel`. Returns the repo root, or
/// `GitError::NotARepo` if `path` isn't inside a working tree.
pub async fn find_repo_root(path: &Path) -> Result<PathBuf, GitError> {
    let output = run(path, &["rev-parse", "--show-toplevel"]).await?;
    if !output.status.success() {
        return Err(GitError::NotARepo {
            path: path.to_path_buf(),
        });
    }
    let root = stdout_str(&output)?.trim().to_string();
    Ok(PathBuf::from(root))
}

/// `git rev-parse --verify <rev>`. `Ok(true)` iff the rev resolves.
pub async fn verify_ref(repo: &Path, rev: &str) -> Result<bool, GitError> {
    let output = run(repo, &["rev-parse", "--verify", "--quiet", rev]).await?;
    Ok(output.status.success())
}

/// `git rev-parse <rev>` resolved to a full 40-character SHA.
pub async fn resolve_sha(repo: &Path, rev: &str) -> Result<String, GitError> {
    let output = run(repo, &["rev-parse", rev]).await?;
    require_success(&["rev-parse", rev], output)
}

/// `git rev-parse --abbrev-ref HEAD`.
pub async fn current_branch(repo: &Path) -> Result<String, GitError> {
    let output = run(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    require_success(&["rev-parse", "--abbrev-ref", "HEAD"], output)
}

/// `git diff --name-status HEAD~1 HEAD`.
///
/// Returns an empty vec (not an error) for a repo's first commit, where
/// `HEAD~1` doesn't resolve.
pub async fn diff_name_status_head(repo: &Path) -> Result<Vec<DiffEntry>, GitError> {
    if !verify_ref(repo, "HEAD~1").await? {
        return Ok(Vec::new());
    }
    let output = run(repo, &["diff", "--name-status", "HEAD~1", "HEAD"]).await?;
    let text = require_success(&["diff", "--name-status"], output)?;
    Ok(parse_name_status(&text))
}

fn parse_name_status(text: &str) -> Vec<DiffEntry> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, '\t');
            let status = parts.next()?.trim().to_string();
            let path = parts.next()?.trim().to_string();
            if status.is_empty() || path.is_empty() {
                return None;
            }
            // Renames carry "old\tnew" after the status; keep the new path.
            let path = path.rsplit('\t').next().unwrap_or(&path).to_string();
            Some(DiffEntry { path, status })
        })
        .collect()
}

/// `git hash-object -w --stdin`, writing `bytes` as a loose blob and
/// returning its SHA.
pub async fn hash_object_stdin(repo: &Path, bytes: &[u8]) -> Result<String, GitError> {
    let mut cmd = Command::new("git");
    cmd.args(["hash-object", "-w", "--stdin"])
        .current_dir(repo)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|_| GitError::NotFound)?;
    let mut stdin = child.stdin.take().expect("stdin piped");
    stdin.write_all(bytes).await?;
    drop(stdin);

    let output = tokio::time::timeout(GIT_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| GitError::Timeout {
            subcommand: "hash-object".to_string(),
        })??;

    require_success(&["hash-object", "-w", "--stdin"], output)
}

/// One line of `git mktree` input: `<mode> <type> <sha>\t<path>`.
pub struct TreeEntry {
    pub mode: &'static str,
    pub object_type: &'static str,
    pub sha: String,
    pub path: String,
}

/// `git mktree`, building a tree object from explicit entries.
pub async fn mktree(repo: &Path, entries: &[TreeEntry]) -> Result<String, GitError> {
    let input = entries
        .iter()
        .map(|e| format!("{} {} {}\t{}", e.mode, e.object_type, e.sha, e.path))
        .collect::<Vec<_>>()
        .join("\n");

    let mut cmd = Command::new("git");
    cmd.arg("mktree")
        .current_dir(repo)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|_| GitError::NotFound)?;
    let mut stdin = child.stdin.take().expect("stdin piped");
    stdin.write_all(input.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    drop(stdin);

    let output = tokio::time::timeout(GIT_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| GitError::Timeout {
            subcommand: "mktree".to_string(),
        })??;

    require_success(&["mktree"], output)
}

/// `git commit-tree <tree> [-p <parent>] -m <message>`.
pub async fn commit_tree(
    repo: &Path,
    tree_sha: &str,
    parent_sha: Option<&str>,
    message: &str,
) -> Result<String, GitError> {
    let mut args: Vec<&str> = vec!["commit-tree", tree_sha];
    if let Some(parent) = parent_sha {
        args.push("-p");
        args.push(parent);
    }
    args.push("-m");
    args.push(message);

    let output = run(repo, &args).await?;
    require_success(&args, output)
}

/// `git update-ref <refname> <sha>`.
pub async fn update_ref(repo: &Path, refname: &str, sha: &str) -> Result<(), GitError> {
    let output = run(repo, &["update-ref", refname, sha]).await?;
    require_success(&["update-ref", refname, sha], output)?;
    Ok(())
}

/// `git show <ref>:<path>`, returning the raw blob bytes.
pub async fn show_blob(repo: &Path, ref_and_path: &str) -> Result<Vec<u8>, GitError> {
    let output = run(repo, &["show", ref_and_path]).await?;
    if !output.status.success() {
        return Err(GitError::CommandFailed {
            subcommand: format!("show {ref_and_path}"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// `git fetch <remote> <refspec>`. Non-fatal callers should downgrade a
/// `CommandFailed` (e.g. "no remote") to a warning themselves.
pub async fn fetch(repo: &Path, remote: &str, refspec: &str) -> Result<(), GitError> {
    let output = run(repo, &["fetch", remote, refspec]).await?;
    require_success(&["fetch", remote, refspec], output)?;
    Ok(())
}

/// `git push --no-verify [--force] <remote> <refspec>`.
pub async fn push(
    repo: &Path,
    remote: &str,
    refspec: &str,
    force: bool,
) -> Result<(), GitError> {
    let mut args = vec!["push", "--no-verify"];
    if force {
        args.push("--force");
    }
    args.push(remote);
    args.push(refspec);

    let output = run(repo, &args).await?;
    require_success(&args, output)?;
    Ok(())
}

/// `git for-each-ref --format=%(refname) <pattern>`.
pub async fn for_each_ref(repo: &Path, pattern: &str) -> Result<Vec<String>, GitError> {
    let output = run(repo, &["for-each-ref", "--format=%(refname)", pattern]).await?;
    let text = require_success(&["for-each-ref", pattern], output)?;
    Ok(text.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}

/// `git config <key>`. Returns `None` when the key is unset rather than
/// treating that as an error.
pub async fn config_get(repo: &Path, key: &str) -> Result<Option<String>, GitError> {
    let output = run(repo, &["config", key]).await?;
    if !output.status.success() {
        return Ok(None);
    }
    let value = stdout_str(&output)?.trim().to_string();
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// `git remote get-url origin`. Returns `None` when no `origin` remote
/// is configured.
pub async fn remote_get_url(repo: &Path, remote: &str) -> Result<Option<String>, GitError> {
    let output = run(repo, &["remote", "get-url", remote]).await?;
    if !output.status.success() {
        return Ok(None);
    }
    let url = stdout_str(&output)?.trim().to_string();
    Ok(if url.is_empty() { None } else { Some(url) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_name_status_handles_simple_statuses() {
        let text = "M\tsrc/lib.rs\nA\tsrc/new.rs\nD\told.rs";
        let entries = parse_name_status(text);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], DiffEntry { path: "src/lib.rs".into(), status: "M".into() });
        assert_eq!(entries[1].status, "A");
        assert_eq!(entries[2].status, "D");
    }

    #[test]
    fn parse_name_status_handles_rename_with_two_paths() {
        let text = "R100\told_name.rs\tnew_name.rs";
        let entries = parse_name_status(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "R100");
        assert_eq!(entries[0].path, "new_name.rs");
    }

    #[test]
    fn parse_name_status_skips_blank_lines() {
        let text = "M\ta.rs\n\n\nA\tb.rs\n";
        let entries = parse_name_status(text);
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn find_repo_root_fails_outside_a_repo() {
        let dir = tempfile::tempdir_in("/tmp").unwrap();
        let result = find_repo_root(dir.path()).await;
        assert!(matches!(result, Err(GitError::NotARepo { .. })));
    }

    #[tokio::test]
    async fn config_get_returns_none_for_unset_key() {
        let dir = tempfile::tempdir_in("/tmp").unwrap();
        let output = Command::new("git")
            .arg("init")
            .current_dir(dir.path())
            .output()
            .await;
        if output.is_err() {
            return; // git not on PATH in this environment; skip.
        }
        let value = config_get(dir.path(), "rekal.nonexistent-key").await.unwrap();
        assert!(value.is_none());
    }
}
