// crates/cli/src/commands/clean.rs
use anyhow::Result;

use crate::{context::RekalContext, hooks};

pub async fn run() -> Result<()> {
    let ctx = RekalContext::discover().await?;

    let dir = ctx.rekal_dir();
    if dir.is_dir() {
        tokio::fs::remove_dir_all(&dir).await?;
    }
    hooks::remove(&ctx.git_root)?;

    println!("clean: removed .rekal/ and managed hooks");
    Ok(())
}
