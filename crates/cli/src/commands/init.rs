// crates/cli/src/commands/init.rs
use anyhow::Result;
use rekal_core::git;
use rekal_db::{branch, Store};
use rekal_search::IndexStore;
use rekal_wire::Dictionary;

use crate::{context::RekalContext, gitignore, hooks};

pub async fn run() -> Result<()> {
    let ctx = RekalContext::discover().await?;

    tokio::fs::create_dir_all(ctx.rekal_dir()).await?;
    Store::open(&ctx.data_db_path())?;
    IndexStore::open(&ctx.index_db_path())?;

    hooks::install(&ctx.git_root)?;
    gitignore::ensure_entry(&ctx.git_root)?;

    let branch_name = ctx.user_branch();
    let local_ref = format!("refs/heads/{branch_name}");

    if !git::verify_ref(&ctx.git_root, &local_ref).await? {
        ensure_branch(&ctx, &branch_name).await?;
    }

    println!("init: ready on {branch_name}");
    Ok(())
}

async fn ensure_branch(ctx: &RekalContext, branch_name: &str) -> Result<()> {
    let has_remote = git::remote_get_url(&ctx.git_root, "origin").await?.is_some();
    let remote_ref = format!("refs/remotes/origin/{branch_name}");

    if has_remote {
        let fetch_result = git::fetch(
            &ctx.git_root,
            "origin",
            &format!("refs/heads/{branch_name}:{remote_ref}"),
        )
        .await;

        if fetch_result.is_ok() {
            if let Some((body, dict)) = branch::read_branch(&ctx.git_root, &remote_ref).await? {
                branch::adopt_remote(&ctx.git_root, branch_name, &remote_ref).await?;
                let store = Store::open(&ctx.data_db_path())?;
                let stats = rekal_db::import::run_self_sync(&store, &body, &dict)?;
                println!(
                    "init: imported {} session(s), {} checkpoint(s) from origin",
                    stats.sessions_imported, stats.checkpoints_imported
                );
                return Ok(());
            }
        }
    }

    let body = rekal_wire::new_body();
    let dict = Dictionary::new();
    branch::commit_branch(&ctx.git_root, branch_name, &body, &dict, "rekal: init").await?;
    Ok(())
}
