//! Git-branch transport for the body+dict pair.
//!
//! A user's ledger branch (`rekal/<email>`) is an orphan branch whose
//! tree contains exactly two blobs: `rekal.body` and `dict.bin`. This
//! module is the glue between the wire-format engines (which only see
//! in-memory bytes) and the git subprocess adapter (which only sees
//! blobs, trees, and commits) — export/import stay ignorant of git, and
//! the git adapter stays ignorant of the wire format.

use std::path::Path;

use rekal_core::git;
use rekal_wire::Dictionary;

use crate::error::DbResult;

const BODY_BLOB_PATH: &str = "rekal.body";
const DICT_BLOB_PATH: &str = "dict.bin";
const BLOB_MODE: &str = "100644";

/// The branch name for a given author email.
pub fn user_branch(email: &str) -> String {
    format!("rekal/{email}")
}

/// Read the body+dict pair off `refname` (a local branch ref or a
/// remote-tracking ref). `None` when the ref doesn't resolve.
pub async fn read_branch(repo: &Path, refname: &str) -> DbResult<Option<(Vec<u8>, Dictionary)>> {
    if !git::verify_ref(repo, refname).await? {
        return Ok(None);
    }
    let body = git::show_blob(repo, &format!("{refname}:{BODY_BLOB_PATH}")).await?;
    let dict_bytes = git::show_blob(repo, &format!("{refname}:{DICT_BLOB_PATH}")).await?;
    let dict = Dictionary::decode(&dict_bytes)?;
    Ok(Some((body, dict)))
}

/// Write `body`+`dict` as a new commit on `branch` (orphan if the branch
/// doesn't exist yet), and move the branch ref to point at it. Returns
/// the new commit sha.
pub async fn commit_branch(
    repo: &Path,
    branch: &str,
    body: &[u8],
    dict: &Dictionary,
    message: &str,
) -> DbResult<String> {
    let refname = format!("refs/heads/{branch}");
    let parent = if git::verify_ref(repo, &refname).await? {
        Some(git::resolve_sha(repo, &refname).await?)
    } else {
        None
    };

    let body_sha = git::hash_object_stdin(repo, body).await?;
    let dict_sha = git::hash_object_stdin(repo, &dict.encode()).await?;

    let tree_sha = git::mktree(
        repo,
        &[
            git::TreeEntry {
                mode: BLOB_MODE,
                object_type: "blob",
                sha: body_sha,
                path: BODY_BLOB_PATH.to_string(),
            },
            git::TreeEntry {
                mode: BLOB_MODE,
                object_type: "blob",
                sha: dict_sha,
                path: DICT_BLOB_PATH.to_string(),
            },
        ],
    )
    .await?;

    let commit_sha = git::commit_tree(repo, &tree_sha, parent.as_deref(), message).await?;
    git::update_ref(repo, &refname, &commit_sha).await?;
    Ok(commit_sha)
}

/// Point `refs/heads/<branch>` at the same commit an already-fetched
/// remote-tracking ref resolves to, without creating a new commit.
/// Used by `init` when adopting an existing remote ledger as-is.
pub async fn adopt_remote(repo: &Path, branch: &str, remote_refname: &str) -> DbResult<()> {
    let sha = git::resolve_sha(repo, remote_refname).await?;
    git::update_ref(repo, &format!("refs/heads/{branch}"), &sha).await?;
    Ok(())
}
