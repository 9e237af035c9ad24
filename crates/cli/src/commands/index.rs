// crates/cli/src/commands/index.rs
use anyhow::Result;
use rekal_search::IndexStore;

use crate::context::RekalContext;

pub async fn run() -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let index = IndexStore::open(&ctx.index_db_path())?;
    rekal_search::rebuild(&index, &ctx.data_db_path())?;

    println!("index: rebuilt from data store");
    Ok(())
}
