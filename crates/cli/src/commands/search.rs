// crates/cli/src/commands/search.rs
use anyhow::Result;
use rekal_search::{IndexStore, SearchFilters};

use crate::context::RekalContext;

pub async fn run(query: &str, filters: SearchFilters, limit: Option<usize>) -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let index = IndexStore::open(&ctx.index_db_path())?;
    let lsa = index.load_lsa_model()?;

    let output = rekal_search::search(&index, lsa.as_ref(), query, &filters, limit)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
