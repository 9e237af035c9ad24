// crates/cli/src/commands/query.rs
use anyhow::Result;
use rekal_db::Store;
use rekal_search::IndexStore;

use crate::context::RekalContext;

pub async fn run(sql: &str, use_index: bool) -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let rows = if use_index {
        let index = IndexStore::open(&ctx.index_db_path())?;
        index.query_readonly(sql)?
    } else {
        let store = Store::open(&ctx.data_db_path())?;
        store.query_readonly(sql)?
    };

    for row in rows {
        println!("{}", row.join("\t"));
    }
    Ok(())
}
