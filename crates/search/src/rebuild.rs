//! Transactional index rebuild: drop every index table, re-read the data
//! store by attaching it read-only, and repopulate in order:
//! `turns_ft` → `tool_calls_index` → `files_index` → `session_facets`
//! → `file_cooccurrence` → FTS optimize → LSA pass.

use std::path::Path;

use crate::error::SearchResult;
use crate::lsa::{train, DEFAULT_DIMENSION};
use crate::store::IndexStore;

const WRITE_CLASS_TOOLS: &[&str] = &["Write", "Edit", "NotebookEdit"];

pub fn rebuild(index: &IndexStore, data_db_path: &Path) -> SearchResult<()> {
    index.reset()?;
    let conn = index.conn();

    conn.execute(
        "ATTACH DATABASE ?1 AS data_store",
        [data_db_path.to_string_lossy().to_string()],
    )?;

    let result = rebuild_attached(index);

    // Always detach, even on failure, so a retried rebuild doesn't trip
    // over an already-attached name.
    let _ = conn.execute("DETACH DATABASE data_store", []);
    result
}

fn rebuild_attached(index: &IndexStore) -> SearchResult<()> {
    let conn = index.conn();

    // turns_ft
    {
        let mut stmt = conn.prepare(
            "SELECT session_id, turn_index, role, text FROM data_store.turns ORDER BY session_id, turn_index",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (session_id, turn_index, role, text) in rows {
            index.insert_turn_ft(&session_id, turn_index, &role, &text)?;
        }
        conn.execute("INSERT INTO turns_ft(turns_ft) VALUES('optimize')", [])?;
    }

    // tool_calls_index
    {
        let mut stmt = conn.prepare(
            "SELECT session_id, call_order, tool_name, file_path FROM data_store.tool_calls",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (session_id, call_order, tool_name, file_path) in rows {
            index.insert_tool_call_index(&session_id, call_order, &tool_name, file_path.as_deref())?;
        }
    }

    // files_index: checkpoint-linked files, denormalized through the link table.
    {
        let mut stmt = conn.prepare(
            "SELECT cs.session_id, ft.checkpoint_id, ft.path, ft.change_kind \
             FROM data_store.files_touched ft \
             JOIN data_store.checkpoint_sessions cs ON cs.checkpoint_id = ft.checkpoint_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (session_id, checkpoint_id, path, change_kind) in rows {
            index.insert_file_index_row(&session_id, Some(&checkpoint_id), &path, &change_kind)?;
        }
    }

    // Supplemental pass: write-class tool-call paths not already covered
    // by a checkpoint's git diff, tagged as tool-derived (`T`).
    {
        let placeholders = WRITE_CLASS_TOOLS.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT session_id, file_path FROM data_store.tool_calls \
             WHERE tool_name IN ({placeholders}) AND file_path IS NOT NULL"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            WRITE_CLASS_TOOLS.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (session_id, path) in rows {
            if !index.file_already_indexed(&session_id, &path)? {
                index.insert_file_index_row(&session_id, None, &path, "T")?;
            }
        }
    }

    // session_facets
    {
        let mut stmt = conn.prepare(
            "SELECT s.id, s.author_email, s.actor, s.branch, s.captured_at, \
                    (SELECT COUNT(*) FROM data_store.turns t WHERE t.session_id = s.id), \
                    (SELECT COUNT(*) FROM data_store.tool_calls tc WHERE tc.session_id = s.id), \
                    (SELECT cp.id FROM data_store.checkpoint_sessions cs \
                       JOIN data_store.checkpoints cp ON cp.id = cs.checkpoint_id \
                       WHERE cs.session_id = s.id ORDER BY cp.timestamp DESC LIMIT 1), \
                    (SELECT cp.commit_sha FROM data_store.checkpoint_sessions cs \
                       JOIN data_store.checkpoints cp ON cp.id = cs.checkpoint_id \
                       WHERE cs.session_id = s.id ORDER BY cp.timestamp DESC LIMIT 1) \
             FROM data_store.sessions s",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (session_id, author_email, actor, branch, captured_at, turn_count, tool_call_count, checkpoint_id, commit_sha) in rows {
            let file_count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT path) FROM files_index WHERE session_id = ?1",
                [&session_id],
                |row| row.get(0),
            )?;
            index.upsert_facet(
                &session_id,
                &author_email,
                &actor,
                &branch,
                captured_at,
                checkpoint_id.as_deref(),
                commit_sha.as_deref(),
                turn_count,
                tool_call_count,
                file_count,
            )?;
        }
    }

    // file_cooccurrence: self-join on tool-call paths within a session,
    // then rolled up into unordered-pair edges counting how many distinct
    // sessions touched both files.
    {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT a.session_id, a.file_path, b.file_path \
             FROM data_store.tool_calls a \
             JOIN data_store.tool_calls b ON a.session_id = b.session_id AND a.file_path < b.file_path \
             WHERE a.file_path IS NOT NULL AND b.file_path IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (_session_id, path_a, path_b) in rows {
            index.record_cooccurrence(&path_a, &path_b)?;
        }
    }

    // LSA pass, only with >= 2 sessions.
    let mut turn_total: i64 = 0;
    let mut session_count: i64 = 0;
    let mut embedding_dimension: i64 = 0;
    {
        let mut stmt = conn.prepare(
            "SELECT s.id, GROUP_CONCAT(t.text, ' ') \
             FROM data_store.sessions s \
             LEFT JOIN (SELECT session_id, text FROM data_store.turns ORDER BY session_id, turn_index) t \
               ON t.session_id = s.id \
             GROUP BY s.id",
        )?;
        let docs = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default()))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        session_count = docs.len() as i64;

        turn_total = conn.query_row("SELECT COUNT(*) FROM data_store.turns", [], |row| row.get(0))?;

        if let Some(model) = train(&docs, DEFAULT_DIMENSION) {
            embedding_dimension = model.dimension as i64;
            for (session_id, embedding) in &model.session_embeddings {
                let as_f32: Vec<f32> = embedding.iter().map(|&v| v as f32).collect();
                index.upsert_embedding(session_id, &as_f32)?;
            }
            index.save_lsa_basis(&model)?;
        }
    }

    index.record_index_state(session_count, turn_total, embedding_dimension, now_unix())?;

    Ok(())
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
