// crates/cli/src/commands/checkpoint.rs
use anyhow::Result;
use rekal_db::Store;

use crate::context::RekalContext;

pub async fn run() -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let store = Store::open(&ctx.data_db_path())?;
    let discovery_dir = rekal_db::checkpoint::discovery_dir_for(&ctx.home, &ctx.git_root);

    let count = rekal_db::checkpoint::run(&store, &ctx.git_root, &discovery_dir, &ctx.author_email).await?;
    if count > 0 {
        println!("checkpoint: captured {count} session(s)");
    }
    Ok(())
}
