// crates/cli/src/hooks.rs
//! Post-commit/pre-push hook installation. Every hook this tool writes
//! carries a `# managed by rekal` marker so `clean` only ever removes
//! hooks it installed itself, never a user's pre-existing script.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const MARKER: &str = "# managed by rekal";

fn hook_path(git_root: &Path, name: &str) -> PathBuf {
    git_root.join(".git").join("hooks").join(name)
}

fn hook_body(subcommand: &str) -> String {
    format!(
        "#!/bin/sh\n\
         {MARKER}\n\
         if command -v rekal >/dev/null 2>&1; then\n\
         \trekal {subcommand}\n\
         elif [ -x \"$HOME/.local/bin/rekal\" ]; then\n\
         \t\"$HOME/.local/bin/rekal\" {subcommand}\n\
         fi\n"
    )
}

/// Install the post-commit and pre-push hooks. Leaves alone any existing
/// hook file that doesn't carry this tool's marker, so a user's own
/// hooks are never silently clobbered.
pub fn install(git_root: &Path) -> Result<()> {
    install_one(git_root, "post-commit", "checkpoint")?;
    install_one(git_root, "pre-push", "push")?;
    Ok(())
}

fn install_one(git_root: &Path, name: &str, subcommand: &str) -> Result<()> {
    let path = hook_path(git_root, name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("rekal: could not create {}", parent.display()))?;
    }

    if path.exists() {
        let existing = std::fs::read_to_string(&path).unwrap_or_default();
        if !existing.contains(MARKER) {
            tracing::warn!("{}: leaving existing unmanaged hook in place", path.display());
            return Ok(());
        }
    }

    std::fs::write(&path, hook_body(subcommand))
        .with_context(|| format!("rekal: could not write {}", path.display()))?;
    set_executable(&path)?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Remove only the hooks this tool installed (those carrying the marker).
/// Idempotent — a missing or already-clean hook file is not an error.
pub fn remove(git_root: &Path) -> Result<()> {
    for name in ["post-commit", "pre-push"] {
        let path = hook_path(git_root, name);
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        if contents.contains(MARKER) {
            std::fs::remove_file(&path).with_context(|| format!("rekal: could not remove {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_then_remove_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git").join("hooks")).unwrap();

        install(dir.path()).unwrap();
        assert!(hook_path(dir.path(), "post-commit").exists());
        assert!(hook_path(dir.path(), "pre-push").exists());

        remove(dir.path()).unwrap();
        assert!(!hook_path(dir.path(), "post-commit").exists());
        assert!(!hook_path(dir.path(), "pre-push").exists());
    }

    #[test]
    fn remove_leaves_unmanaged_hooks_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git").join("hooks")).unwrap();
        let path = hook_path(dir.path(), "post-commit");
        std::fs::write(&path, "#!/bin/sh\necho custom\n").unwrap();

        remove(dir.path()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn install_does_not_overwrite_unmanaged_hook() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git").join("hooks")).unwrap();
        let path = hook_path(dir.path(), "post-commit");
        std::fs::write(&path, "#!/bin/sh\necho custom\n").unwrap();

        install(dir.path()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("custom"));
        assert!(!contents.contains(MARKER));
    }
}
