// crates/cli/src/gitignore.rs
//! Appends `.rekal/` to the repo's root `.gitignore`, once.

use std::path::Path;

use anyhow::{Context, Result};

const ENTRY: &str = ".rekal/";

/// Ensure `.gitignore` ignores `.rekal/`. A no-op if the entry is
/// already present anywhere in the file.
pub fn ensure_entry(git_root: &Path) -> Result<()> {
    let path = git_root.join(".gitignore");
    let existing = std::fs::read_to_string(&path).unwrap_or_default();

    if existing.lines().any(|l| l.trim() == ENTRY.trim_end_matches('/') || l.trim() == ENTRY) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(ENTRY);
    updated.push('\n');

    std::fs::write(&path, updated).with_context(|| format!("rekal: could not write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_entry_to_missing_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        ensure_entry(dir.path()).unwrap();
        let contents = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(contents.contains(".rekal/"));
    }

    #[test]
    fn does_not_duplicate_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/\n.rekal/\n").unwrap();
        ensure_entry(dir.path()).unwrap();
        let contents = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(contents.matches(".rekal/").count(), 1);
    }

    #[test]
    fn preserves_existing_content_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/").unwrap();
        ensure_entry(dir.path()).unwrap();
        let contents = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(contents, "target/\n.rekal/\n");
    }
}
