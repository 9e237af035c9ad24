//! The derived index store: FTS rows, denormalized file/tool projections,
//! per-session facets, and embeddings. Entirely rebuildable from the data
//! store — nothing here is authoritative.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{SearchError, SearchResult};
use crate::migrations::{drop_index_tables, run_migrations};
use crate::tokenize::strip_stopwords;

pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    pub fn open(path: &std::path::Path) -> SearchResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> SearchResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Drop and recreate every index table. Callers repopulate afterward;
    /// this alone leaves the store empty but schema-valid.
    pub fn reset(&self) -> SearchResult<()> {
        drop_index_tables(&self.conn)?;
        run_migrations(&self.conn)?;
        Ok(())
    }

    /// `content` is indexed with stopwords stripped (FTS5's `porter`
    /// tokenizer stems but has no stopword facility); `raw_content` keeps
    /// the untouched text so snippets still read naturally.
    pub fn insert_turn_ft(
        &self,
        session_id: &str,
        turn_index: u32,
        role: &str,
        content: &str,
    ) -> SearchResult<()> {
        let indexed = strip_stopwords(content);
        self.conn.execute(
            "INSERT INTO turns_ft (session_id, turn_index, role, content, raw_content) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, turn_index, role, indexed, content],
        )?;
        Ok(())
    }

    pub fn insert_tool_call_index(
        &self,
        session_id: &str,
        call_order: u32,
        tool_name: &str,
        file_path: Option<&str>,
    ) -> SearchResult<()> {
        self.conn.execute(
            "INSERT INTO tool_calls_index (session_id, call_order, tool_name, file_path) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, call_order, tool_name, file_path],
        )?;
        Ok(())
    }

    pub fn insert_file_index_row(
        &self,
        session_id: &str,
        checkpoint_id: Option<&str>,
        path: &str,
        change_kind: &str,
    ) -> SearchResult<()> {
        self.conn.execute(
            "INSERT INTO files_index (session_id, checkpoint_id, path, change_kind) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, checkpoint_id, path, change_kind],
        )?;
        Ok(())
    }

    pub fn file_already_indexed(&self, session_id: &str, path: &str) -> SearchResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM files_index WHERE session_id = ?1 AND path = ?2",
                params![session_id, path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Record one more session in which `path_a`/`path_b` (already
    /// ordered `path_a < path_b` by the caller) co-occurred, creating the
    /// edge on first sight and incrementing its count otherwise.
    pub fn record_cooccurrence(&self, path_a: &str, path_b: &str) -> SearchResult<()> {
        self.conn.execute(
            "INSERT INTO file_cooccurrence (path_a, path_b, count) VALUES (?1, ?2, 1) \
             ON CONFLICT(path_a, path_b) DO UPDATE SET count = count + 1",
            params![path_a, path_b],
        )?;
        Ok(())
    }

    /// Insert or replace a full facet row, as written by a local rebuild.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_facet(
        &self,
        session_id: &str,
        author_email: &str,
        actor: &str,
        branch: &str,
        captured_at: i64,
        checkpoint_id: Option<&str>,
        commit_sha: Option<&str>,
        turn_count: i64,
        tool_call_count: i64,
        file_count: i64,
    ) -> SearchResult<()> {
        self.conn.execute(
            "INSERT INTO session_facets \
                (session_id, author_email, actor, branch, captured_at, checkpoint_id, commit_sha, turn_count, tool_call_count, file_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(session_id) DO UPDATE SET \
                author_email = excluded.author_email, \
                actor = excluded.actor, \
                branch = excluded.branch, \
                captured_at = excluded.captured_at, \
                checkpoint_id = COALESCE(excluded.checkpoint_id, session_facets.checkpoint_id), \
                commit_sha = COALESCE(excluded.commit_sha, session_facets.commit_sha), \
                turn_count = excluded.turn_count, \
                tool_call_count = excluded.tool_call_count, \
                file_count = excluded.file_count",
            params![
                session_id,
                author_email,
                actor,
                branch,
                captured_at,
                checkpoint_id,
                commit_sha,
                turn_count,
                tool_call_count,
                file_count
            ],
        )?;
        Ok(())
    }

    /// Team-sync's minimal facet insert: `tool_call_count=0` always,
    /// since tool calls are never transported to other users' indexes.
    pub fn insert_facet_from_team_sync(
        &self,
        session_id: &str,
        author_email: &str,
        actor: &str,
        branch: &str,
        captured_at: i64,
        turn_count: i64,
    ) -> SearchResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO session_facets \
                (session_id, author_email, actor, branch, captured_at, turn_count, tool_call_count, file_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)",
            params![session_id, author_email, actor, branch, captured_at, turn_count],
        )?;
        Ok(())
    }

    /// Team-sync's checkpoint update: attach commit sha / checkpoint id /
    /// file count to every session the checkpoint links, without touching
    /// tool_call_count.
    pub fn apply_team_sync_checkpoint(
        &self,
        session_id: &str,
        checkpoint_id: &str,
        commit_sha: &str,
        file_count: i64,
    ) -> SearchResult<()> {
        self.conn.execute(
            "UPDATE session_facets SET checkpoint_id = ?2, commit_sha = ?3, file_count = ?4 WHERE session_id = ?1",
            params![session_id, checkpoint_id, commit_sha, file_count],
        )?;
        Ok(())
    }

    pub fn record_index_state(
        &self,
        session_count: i64,
        turn_count: i64,
        embedding_dimension: i64,
        last_indexed_at: i64,
    ) -> SearchResult<()> {
        self.conn.execute(
            "INSERT INTO index_state (id, session_count, turn_count, embedding_dimension, last_indexed_at) \
             VALUES (1, ?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET \
                session_count = excluded.session_count, \
                turn_count = excluded.turn_count, \
                embedding_dimension = excluded.embedding_dimension, \
                last_indexed_at = excluded.last_indexed_at",
            params![session_count, turn_count, embedding_dimension, last_indexed_at],
        )?;
        Ok(())
    }

    pub fn upsert_embedding(&self, session_id: &str, vector: &[f32]) -> SearchResult<()> {
        let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        self.conn.execute(
            "INSERT INTO embeddings (session_id, dim, vector) VALUES (?1, ?2, ?3) \
             ON CONFLICT(session_id) DO UPDATE SET dim = excluded.dim, vector = excluded.vector",
            params![session_id, vector.len() as i64, bytes],
        )?;
        Ok(())
    }

    pub fn all_embeddings(&self) -> SearchResult<Vec<(String, Vec<f32>)>> {
        let mut stmt = self.conn.prepare("SELECT session_id, vector FROM embeddings")?;
        let rows = stmt
            .query_map([], |row| {
                let session_id: String = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok((session_id, bytes))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(id, bytes)| (id, bytes_to_f32_vec(&bytes)))
            .collect())
    }

    /// Persist the trained LSA basis so a later process can project
    /// queries without retraining. `session_embeddings` live separately
    /// in the `embeddings` table.
    pub fn save_lsa_basis(&self, model: &crate::lsa::LsaModel) -> SearchResult<()> {
        let vocab = model.vocab().join("\n");
        let idf_bytes = f64_slice_to_bytes(model.idf());
        let u_k = model.u_k();
        let n_terms = u_k.nrows();
        let dimension = model.sigma_k().len();
        let mut u_k_bytes = Vec::with_capacity(n_terms * dimension * 8);
        for j in 0..dimension {
            for i in 0..n_terms {
                u_k_bytes.extend_from_slice(&u_k[(i, j)].to_le_bytes());
            }
        }
        let sigma_bytes = f64_slice_to_bytes(model.sigma_k());

        self.conn.execute(
            "INSERT INTO lsa_model (id, vocab, idf, u_k, sigma_k, n_terms, dimension) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
                vocab = excluded.vocab, idf = excluded.idf, u_k = excluded.u_k, \
                sigma_k = excluded.sigma_k, n_terms = excluded.n_terms, dimension = excluded.dimension",
            params![vocab, idf_bytes, u_k_bytes, sigma_bytes, n_terms as i64, dimension as i64],
        )?;
        Ok(())
    }

    /// Load the persisted LSA basis plus stored session embeddings, ready
    /// to answer queries. Returns `None` when no model was trained (fewer
    /// than 2 sessions at the last rebuild).
    pub fn load_lsa_model(&self) -> SearchResult<Option<crate::lsa::LsaModel>> {
        let row = self
            .conn
            .query_row(
                "SELECT vocab, idf, u_k, sigma_k, n_terms, dimension FROM lsa_model WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, i64>(4)? as usize,
                        row.get::<_, i64>(5)? as usize,
                    ))
                },
            )
            .optional()?;

        let Some((vocab_text, idf_bytes, u_k_bytes, sigma_bytes, n_terms, dimension)) = row else {
            return Ok(None);
        };

        let vocab: Vec<String> = vocab_text.lines().map(str::to_string).collect();
        let idf = bytes_to_f64_vec(&idf_bytes);
        let sigma_k = bytes_to_f64_vec(&sigma_bytes);
        let flat = bytes_to_f64_vec(&u_k_bytes);
        let u_k = nalgebra::DMatrix::from_fn(n_terms, dimension, |i, j| flat[j * n_terms + i]);

        let session_embeddings = self
            .all_embeddings()?
            .into_iter()
            .map(|(id, v)| (id, v.into_iter().map(|f| f as f64).collect()))
            .collect();

        Ok(Some(crate::lsa::LsaModel::from_parts(
            vocab,
            idf,
            u_k,
            sigma_k,
            session_embeddings,
        )))
    }

    pub fn query_readonly(&self, sql: &str) -> SearchResult<Vec<Vec<String>>> {
        let trimmed = sql.trim_start().to_ascii_lowercase();
        if !trimmed.starts_with("select") && !trimmed.starts_with("with") && !trimmed.starts_with("pragma") {
            return Err(SearchError::NotReadOnly);
        }
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value: rusqlite::types::Value = row.get(i)?;
                    values.push(format_value(value));
                }
                Ok(values)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn f64_slice_to_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_f64_vec(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

fn format_value(value: rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_sync_facet_insert_defaults_tool_call_count_to_zero() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .insert_facet_from_team_sync("s1", "a@example.com", "human", "main", 100, 3)
            .unwrap();

        let tool_call_count: i64 = store
            .conn()
            .query_row(
                "SELECT tool_call_count FROM session_facets WHERE session_id = 's1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tool_call_count, 0);
    }

    #[test]
    fn record_cooccurrence_increments_the_same_edge_across_sessions() {
        let store = IndexStore::open_in_memory().unwrap();
        store.record_cooccurrence("a.rs", "b.rs").unwrap();
        store.record_cooccurrence("a.rs", "b.rs").unwrap();
        store.record_cooccurrence("a.rs", "b.rs").unwrap();

        let count: i64 = store
            .conn()
            .query_row(
                "SELECT count FROM file_cooccurrence WHERE path_a = 'a.rs' AND path_b = 'b.rs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);

        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM file_cooccurrence", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn embedding_round_trips_as_bytes() {
        let store = IndexStore::open_in_memory().unwrap();
        store.upsert_embedding("s1", &[1.0, -2.5, 3.25]).unwrap();
        let all = store.all_embeddings().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "s1");
        assert_eq!(all[0].1, vec![1.0, -2.5, 3.25]);
    }

    #[test]
    fn reset_clears_all_rows() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .insert_facet_from_team_sync("s1", "a@example.com", "human", "main", 100, 3)
            .unwrap();
        store.reset().unwrap();

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM session_facets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
