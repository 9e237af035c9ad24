// crates/cli/src/commands/sync.rs
use anyhow::{bail, Result};
use rekal_core::git;
use rekal_db::{branch, Store};
use rekal_search::IndexStore;

use crate::context::RekalContext;

pub async fn run(self_only: bool) -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let has_remote = git::remote_get_url(&ctx.git_root, "origin").await?.is_some();

    if self_only {
        if !has_remote {
            bail!("rekal: sync --self requires a remote named \"origin\"");
        }
        return sync_self(&ctx).await;
    }

    sync_team(&ctx, has_remote).await
}

async fn sync_self(ctx: &RekalContext) -> Result<()> {
    let branch_name = ctx.user_branch();
    let remote_ref = format!("refs/remotes/origin/{branch_name}");

    git::fetch(&ctx.git_root, "origin", &format!("refs/heads/{branch_name}:{remote_ref}")).await?;

    let Some((body, dict)) = branch::read_branch(&ctx.git_root, &remote_ref).await? else {
        println!("sync: origin has no {branch_name} yet, nothing to pull");
        return Ok(());
    };

    branch::adopt_remote(&ctx.git_root, &branch_name, &remote_ref).await?;

    let store = Store::open(&ctx.data_db_path())?;
    let stats = rekal_db::import::run_self_sync(&store, &body, &dict)?;

    let index = IndexStore::open(&ctx.index_db_path())?;
    rekal_search::rebuild(&index, &ctx.data_db_path())?;

    println!(
        "sync: imported {} session(s), {} checkpoint(s) from origin; index rebuilt",
        stats.sessions_imported, stats.checkpoints_imported
    );
    Ok(())
}

async fn sync_team(ctx: &RekalContext, has_remote: bool) -> Result<()> {
    let own_branch = ctx.user_branch();

    if has_remote {
        if let Err(e) = git::fetch(&ctx.git_root, "origin", "refs/heads/rekal/*:refs/remotes/origin/rekal/*").await {
            tracing::warn!("sync: failed to fetch team branches: {e}");
        }
    }

    let index = IndexStore::open(&ctx.index_db_path())?;
    rekal_search::rebuild(&index, &ctx.data_db_path())?;

    let remote_branches = git::for_each_ref(&ctx.git_root, "refs/remotes/origin/rekal/*")
        .await
        .unwrap_or_default();

    let mut indexed = 0usize;
    for refname in remote_branches {
        let Some(branch_name) = refname.strip_prefix("refs/remotes/origin/") else {
            continue;
        };
        if branch_name == own_branch {
            continue;
        }

        match branch::read_branch(&ctx.git_root, &refname).await {
            Ok(Some((body, dict))) => match rekal_db::import::run_team_sync(&index, &body, &dict) {
                Ok(stats) => indexed += stats.sessions_indexed,
                Err(e) => tracing::warn!("sync: failed to import {branch_name}: {e}"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("sync: failed to read {branch_name}: {e}"),
        }
    }

    println!("sync: index rebuilt, {indexed} teammate session(s) indexed");
    Ok(())
}
