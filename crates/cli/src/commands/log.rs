// crates/cli/src/commands/log.rs
use anyhow::Result;
use rekal_db::Store;

use crate::context::RekalContext;

pub async fn run(limit: Option<usize>) -> Result<()> {
    let ctx = RekalContext::discover().await?;
    ctx.require_initialized()?;

    let store = Store::open(&ctx.data_db_path())?;
    let entries = store.list_checkpoints(limit)?;

    if entries.is_empty() {
        println!("log: no checkpoints yet");
        return Ok(());
    }

    for entry in entries {
        let cp = &entry.checkpoint;
        println!(
            "{}  {}  {}  {} session(s)",
            &cp.commit_sha[..12.min(cp.commit_sha.len())],
            cp.branch,
            cp.author_email,
            entry.session_count
        );
    }
    Ok(())
}
