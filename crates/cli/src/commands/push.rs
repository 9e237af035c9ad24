// crates/cli/src/commands/push.rs
use anyhow::Result;
use rekal_core::{git, GitError};
use rekal_db::{branch, Store};
use rekal_wire::Dictionary;

use crate::context::RekalContext;

pub async fn run(force: bool) -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let store = Store::open(&ctx.data_db_path())?;
    let branch_name = ctx.user_branch();
    let local_ref = format!("refs/heads/{branch_name}");

    let (mut body, mut dict) = branch::read_branch(&ctx.git_root, &local_ref)
        .await?
        .unwrap_or_else(|| (rekal_wire::new_body(), Dictionary::new()));

    let exported = rekal_db::export::run(&store, &mut body, &mut dict, &ctx.author_email)?;
    if exported == 0 {
        println!("push: nothing to export");
        return Ok(());
    }

    branch::commit_branch(&ctx.git_root, &branch_name, &body, &dict, "rekal: export").await?;

    if git::remote_get_url(&ctx.git_root, "origin").await?.is_none() {
        println!("push: exported {exported} checkpoint(s) (no remote configured)");
        return Ok(());
    }

    let refspec = format!("{branch_name}:{branch_name}");
    match git::push(&ctx.git_root, "origin", &refspec, force).await {
        Ok(()) => println!("push: exported {exported} checkpoint(s)"),
        Err(GitError::CommandFailed { stderr, .. }) if !force && looks_non_fast_forward(&stderr) => {
            println!("push: remote has diverged, rerun with --force to overwrite");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn looks_non_fast_forward(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("non-fast-forward") || lower.contains("fetch first") || lower.contains("rejected")
}
