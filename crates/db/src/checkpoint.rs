//! The checkpoint engine: discover new transcripts, capture them as
//! sessions, and anchor any newly captured work to the host repo's
//! current git commit.

use std::path::{Path, PathBuf};

use rekal_core::git;
use rekal_types::{ChangeKind, CheckpointState};
use sha2::{Digest, Sha256};

use crate::error::DbResult;
use crate::store::Store;

const WRITE_CLASS_TOOLS: &[&str] = &["Write", "Edit", "NotebookEdit"];

/// Run one checkpoint pass. Returns the number of newly captured
/// sessions; the caller prints that count and suppresses the line when
/// it's zero.
pub async fn run(
    store: &Store,
    git_root: &Path,
    discovery_dir: &Path,
    author_email: &str,
) -> DbResult<usize> {
    let mut entries = match tokio::fs::read_dir(discovery_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut transcript_paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            transcript_paths.push(path);
        }
    }
    transcript_paths.sort();

    let mut new_session_ids = Vec::new();

    for path in transcript_paths {
        if let Some(session_id) = capture_transcript(store, &path, author_email).await? {
            new_session_ids.push(session_id);
        }
    }

    if !new_session_ids.is_empty() {
        anchor_checkpoint(store, git_root, &new_session_ids, author_email).await?;
        tracing::info!("checkpoint: captured {} new session(s)", new_session_ids.len());
    } else {
        tracing::debug!("checkpoint: no new sessions");
    }

    Ok(new_session_ids.len())
}

/// Process one transcript file. Returns `Some(session_id)` when a new
/// session was inserted, `None` when the file was skipped (unchanged,
/// duplicate content, or empty).
async fn capture_transcript(store: &Store, path: &Path, author_email: &str) -> DbResult<Option<String>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let size = metadata.len();
    let path_str = path.to_string_lossy().to_string();

    if let Some(cached) = store.get_checkpoint_state(&path_str)? {
        if cached.size == size {
            return Ok(None);
        }
    }

    let bytes = tokio::fs::read(path).await?;
    let hash = hex::encode(Sha256::digest(&bytes));

    if store.session_exists_by_hash(&hash)? {
        store.upsert_checkpoint_state(&CheckpointState {
            file_path: path_str,
            size,
            content_hash: hash,
        })?;
        return Ok(None);
    }

    let parsed = match rekal_core::parse_session(path).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("skipping unparseable transcript {}: {e}", path.display());
            return Ok(None);
        }
    };

    if parsed.is_empty() {
        store.upsert_checkpoint_state(&CheckpointState {
            file_path: path_str,
            size,
            content_hash: hash,
        })?;
        return Ok(None);
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    store.insert_session(
        &session_id,
        &hash,
        parsed.captured_at,
        parsed.actor,
        parsed.agent_id.as_deref(),
        author_email,
        &parsed.branch,
    )?;

    for (index, turn) in parsed.turns.iter().enumerate() {
        let ts = if turn.timestamp == 0 { None } else { Some(turn.timestamp) };
        store.insert_turn(&session_id, index as u32, turn.role, &turn.text, ts)?;
    }
    for (order, call) in parsed.tool_calls.iter().enumerate() {
        store.insert_tool_call(
            &session_id,
            order as u32,
            &call.tool_name,
            call.file_path.as_deref(),
            call.command_prefix.as_deref(),
        )?;
    }

    store.upsert_checkpoint_state(&CheckpointState {
        file_path: path_str,
        size,
        content_hash: hash,
    })?;

    Ok(Some(session_id))
}

async fn anchor_checkpoint(
    store: &Store,
    git_root: &Path,
    session_ids: &[String],
    author_email: &str,
) -> DbResult<()> {
    let commit_sha = git::resolve_sha(git_root, "HEAD").await?;
    let branch = git::current_branch(git_root).await?;
    let diff = git::diff_name_status_head(git_root).await?;

    let checkpoint_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    store.insert_checkpoint(
        &checkpoint_id,
        &commit_sha,
        &branch,
        author_email,
        now,
        rekal_types::ActorKind::Human,
        None,
    )?;

    let mut seen_paths = std::collections::HashSet::new();
    for entry in &diff {
        let kind = ChangeKind::from_git_status(&entry.status);
        store.insert_file_touched(&checkpoint_id, &entry.path, kind)?;
        seen_paths.insert(entry.path.clone());
    }

    for session_id in session_ids {
        store.link_checkpoint_session(&checkpoint_id, session_id)?;
    }

    let tool_paths = collect_write_class_paths(store, session_ids, git_root)?;
    for path in tool_paths {
        if !seen_paths.contains(&path) {
            store.insert_file_touched(&checkpoint_id, &path, ChangeKind::ToolDerived)?;
            seen_paths.insert(path);
        }
    }

    Ok(())
}

fn collect_write_class_paths(
    store: &Store,
    session_ids: &[String],
    git_root: &Path,
) -> DbResult<Vec<String>> {
    let mut paths = Vec::new();
    for session_id in session_ids {
        let mut stmt = store.conn().prepare(
            "SELECT file_path FROM tool_calls WHERE session_id = ?1 AND tool_name IN (?2, ?3, ?4) AND file_path IS NOT NULL",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![session_id, WRITE_CLASS_TOOLS[0], WRITE_CLASS_TOOLS[1], WRITE_CLASS_TOOLS[2]],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        for raw in rows {
            paths.push(relativize(git_root, &raw));
        }
    }
    Ok(paths)
}

fn relativize(git_root: &Path, path: &str) -> String {
    let p = Path::new(path);
    match p.strip_prefix(git_root) {
        Ok(rel) => rel.to_string_lossy().to_string(),
        Err(_) => path.to_string(),
    }
}

/// Build the AI host's transcript discovery directory for `git_root`,
/// rooted at `home`.
pub fn discovery_dir_for(home: &Path, git_root: &Path) -> PathBuf {
    rekal_core::paths::transcript_discovery_dir(home, &git_root.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relativize_strips_git_root_prefix() {
        let root = Path::new("/repo");
        assert_eq!(relativize(root, "/repo/src/lib.rs"), "src/lib.rs");
        assert_eq!(relativize(root, "src/lib.rs"), "src/lib.rs");
    }
}
