// crates/cli/src/context.rs
//! Shared discovery for every command: the host git root, the user's
//! home directory, and the author email to attribute captured work to.
//! Centralized here so each command doesn't re-derive it ad hoc.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rekal_core::git;

pub struct RekalContext {
    pub git_root: PathBuf,
    pub home: PathBuf,
    pub author_email: String,
}

impl RekalContext {
    /// Resolve the repo root, home directory, and author email for the
    /// current invocation. `REKAL_HOME`/`REKAL_AUTHOR_EMAIL` env vars
    /// override the usual `dirs::home_dir()`/`git config user.email`
    /// lookups, matching this workspace's `REKAL_*`-prefixed override
    /// convention for testability.
    pub async fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("rekal: could not determine current directory")?;
        let git_root = git::find_repo_root(&cwd)
            .await
            .map_err(|_| anyhow::anyhow!("rekal: not a git repository"))?;

        let home = match std::env::var("REKAL_HOME") {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => dirs::home_dir().ok_or_else(|| anyhow::anyhow!("rekal: could not determine home directory"))?,
        };

        let author_email = match std::env::var("REKAL_AUTHOR_EMAIL") {
            Ok(v) if !v.is_empty() => v,
            _ => git::config_get(&git_root, "user.email")
                .await?
                .ok_or_else(|| anyhow::anyhow!("rekal: no author email (set user.email or REKAL_AUTHOR_EMAIL)"))?,
        };

        Ok(Self { git_root, home, author_email })
    }

    pub fn data_db_path(&self) -> PathBuf {
        rekal_core::paths::data_db_path(&self.git_root)
    }

    pub fn index_db_path(&self) -> PathBuf {
        rekal_core::paths::index_db_path(&self.git_root)
    }

    pub fn rekal_dir(&self) -> PathBuf {
        rekal_core::paths::rekal_dir(&self.git_root)
    }

    pub fn user_branch(&self) -> String {
        rekal_db::branch::user_branch(&self.author_email)
    }

    /// Require `.rekal/` to already exist; most commands other than
    /// `init` operate on an already-initialized repo.
    pub fn require_initialized(&self) -> Result<()> {
        if !self.rekal_dir().is_dir() {
            bail!("rekal: not initialized, run `rekal init` first");
        }
        Ok(())
    }
}
