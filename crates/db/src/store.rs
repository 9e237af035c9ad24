//! The authoritative data store: the append-only table of sessions,
//! turns, tool calls, checkpoints, and the files they touched.

use rekal_types::{ActorKind, ChangeKind, Checkpoint, CheckpointState, Role, Session, ToolCallRecord, Turn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DbError, DbResult};
use crate::migrations::run_migrations;

/// Owns the connection to `.rekal/data.db`.
pub struct Store {
    conn: Connection,
}

/// One row of `log` output: a checkpoint plus how many sessions the
/// link table associates with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointLogEntry {
    pub checkpoint: Checkpoint,
    pub session_count: i64,
}

impl Store {
    pub fn open(path: &std::path::Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn session_exists_by_hash(&self, content_hash: &str) -> DbResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sessions WHERE content_hash = ?1",
                [content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    pub fn session_exists_by_id(&self, id: &str) -> DbResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM sessions WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(exists.is_some())
    }

    /// Insert a session decoded from an imported body frame. Imported
    /// sessions never carry their original content hash over the wire,
    /// so this stores a synthetic one derived from the session id —
    /// unique by construction, and never consulted for dedup purposes
    /// (imports dedup on session id, via [`Store::session_exists_by_id`]).
    pub fn insert_imported_session(
        &self,
        id: &str,
        captured_at: i64,
        actor: ActorKind,
        agent_id: Option<&str>,
        author_email: &str,
        branch: &str,
    ) -> DbResult<()> {
        let synthetic_hash = format!("imported:{id}");
        self.conn.execute(
            "INSERT OR IGNORE INTO sessions (id, content_hash, captured_at, actor, agent_id, author_email, branch) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                synthetic_hash,
                captured_at,
                actor.as_str(),
                agent_id,
                author_email,
                branch
            ],
        )?;
        Ok(())
    }

    /// Insert a new session row. Fails with [`DbError::DuplicateContentHash`]
    /// if a session with the same content hash already exists — the ledger
    /// is append-only and never rewrites a session it has already captured.
    pub fn insert_session(
        &self,
        id: &str,
        content_hash: &str,
        captured_at: i64,
        actor: ActorKind,
        agent_id: Option<&str>,
        author_email: &str,
        branch: &str,
    ) -> DbResult<()> {
        if self.session_exists_by_hash(content_hash)? {
            return Err(DbError::DuplicateContentHash {
                hash: content_hash.to_string(),
            });
        }
        self.conn.execute(
            "INSERT INTO sessions (id, content_hash, captured_at, actor, agent_id, author_email, branch) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                content_hash,
                captured_at,
                actor.as_str(),
                agent_id,
                author_email,
                branch
            ],
        )?;
        Ok(())
    }

    pub fn insert_turn(
        &self,
        session_id: &str,
        index: u32,
        role: Role,
        text: &str,
        timestamp: Option<i64>,
    ) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO turns (session_id, turn_index, role, text, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, index, role.as_str(), text, timestamp],
        )?;
        Ok(())
    }

    pub fn insert_tool_call(
        &self,
        session_id: &str,
        order: u32,
        tool_name: &str,
        file_path: Option<&str>,
        command_prefix: Option<&str>,
    ) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tool_calls (session_id, call_order, tool_name, file_path, command_prefix) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, order, tool_name, file_path, command_prefix],
        )?;
        Ok(())
    }

    /// Insert a checkpoint row. `exported` always starts false; the export
    /// engine flips it once the checkpoint's frames are safely in the body.
    pub fn insert_checkpoint(
        &self,
        id: &str,
        commit_sha: &str,
        branch: &str,
        author_email: &str,
        timestamp: i64,
        actor: ActorKind,
        agent_id: Option<&str>,
    ) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO checkpoints (id, commit_sha, branch, author_email, timestamp, actor, agent_id, exported) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![id, commit_sha, branch, author_email, timestamp, actor.as_str(), agent_id],
        )?;
        Ok(())
    }

    /// Insert a checkpoint decoded from an imported body frame. Always
    /// `exported = 1`: the frame already exists in the body we read it
    /// from, so a later export pass must not re-append it.
    pub fn insert_imported_checkpoint(
        &self,
        id: &str,
        commit_sha: &str,
        branch: &str,
        author_email: &str,
        timestamp: i64,
        actor: ActorKind,
        agent_id: Option<&str>,
    ) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO checkpoints (id, commit_sha, branch, author_email, timestamp, actor, agent_id, exported) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![id, commit_sha, branch, author_email, timestamp, actor.as_str(), agent_id],
        )?;
        Ok(())
    }

    pub fn insert_file_touched(
        &self,
        checkpoint_id: &str,
        path: &str,
        change_kind: ChangeKind,
    ) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO files_touched (checkpoint_id, path, change_kind) VALUES (?1, ?2, ?3)",
            params![checkpoint_id, path, (change_kind.as_byte() as char).to_string()],
        )?;
        Ok(())
    }

    pub fn link_checkpoint_session(&self, checkpoint_id: &str, session_id: &str) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO checkpoint_sessions (checkpoint_id, session_id) VALUES (?1, ?2)",
            params![checkpoint_id, session_id],
        )?;
        Ok(())
    }

    pub fn get_checkpoint_state(&self, file_path: &str) -> DbResult<Option<CheckpointState>> {
        let state = self
            .conn
            .query_row(
                "SELECT file_path, size, content_hash FROM checkpoint_state WHERE file_path = ?1",
                [file_path],
                |row| {
                    Ok(CheckpointState {
                        file_path: row.get(0)?,
                        size: row.get(1)?,
                        content_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    pub fn upsert_checkpoint_state(&self, state: &CheckpointState) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO checkpoint_state (file_path, size, content_hash) VALUES (?1, ?2, ?3) \
             ON CONFLICT(file_path) DO UPDATE SET size = excluded.size, content_hash = excluded.content_hash",
            params![state.file_path, state.size as i64, state.content_hash],
        )?;
        Ok(())
    }

    /// Checkpoints not yet written into the body, oldest first — the order
    /// the export engine must append them in to preserve causal ordering.
    pub fn query_unexported_checkpoints(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM checkpoints WHERE exported = 0 ORDER BY timestamp ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn mark_exported(&self, checkpoint_id: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE checkpoints SET exported = 1 WHERE id = ?1",
            [checkpoint_id],
        )?;
        Ok(())
    }

    pub fn sessions_for_checkpoint(&self, checkpoint_id: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id FROM checkpoint_sessions WHERE checkpoint_id = ?1 ORDER BY session_id",
        )?;
        let ids = stmt
            .query_map([checkpoint_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn get_checkpoint(&self, id: &str) -> DbResult<Option<Checkpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT id, commit_sha, branch, author_email, timestamp, actor, agent_id, exported \
                 FROM checkpoints WHERE id = ?1",
                [id],
                |row| {
                    let actor: String = row.get(5)?;
                    Ok(Checkpoint {
                        id: row.get(0)?,
                        commit_sha: row.get(1)?,
                        branch: row.get(2)?,
                        author_email: row.get(3)?,
                        timestamp: row.get(4)?,
                        actor: actor_from_str(&actor),
                        agent_id: row.get(6)?,
                        exported: row.get::<_, i64>(7)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    pub fn get_session(&self, id: &str) -> DbResult<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, content_hash, captured_at, actor, agent_id, author_email, branch \
                 FROM sessions WHERE id = ?1",
                [id],
                |row| {
                    let actor: String = row.get(3)?;
                    Ok(Session {
                        id: row.get(0)?,
                        content_hash: row.get(1)?,
                        captured_at: row.get(2)?,
                        actor: actor_from_str(&actor),
                        agent_id: row.get(4)?,
                        author_email: row.get(5)?,
                        branch: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn turns_for_session(&self, session_id: &str) -> DbResult<Vec<Turn>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, turn_index, role, text, timestamp FROM turns \
             WHERE session_id = ?1 ORDER BY turn_index ASC",
        )?;
        let rows = stmt
            .query_map([session_id], |row| {
                let role: String = row.get(2)?;
                Ok(Turn {
                    session_id: row.get(0)?,
                    index: row.get(1)?,
                    role: role_from_str(&role),
                    text: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn tool_calls_for_session(&self, session_id: &str) -> DbResult<Vec<ToolCallRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, call_order, tool_name, file_path, command_prefix FROM tool_calls \
             WHERE session_id = ?1 ORDER BY call_order ASC",
        )?;
        let rows = stmt
            .query_map([session_id], |row| {
                Ok(ToolCallRecord {
                    session_id: row.get(0)?,
                    order: row.get(1)?,
                    tool_name: row.get(2)?,
                    file_path: row.get(3)?,
                    command_prefix: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_sessions(&self) -> DbResult<u32> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n as u32)
    }

    pub fn count_checkpoints(&self) -> DbResult<u32> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(n as u32)
    }

    pub fn files_for_checkpoint(&self, checkpoint_id: &str) -> DbResult<Vec<(String, ChangeKind)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, change_kind FROM files_touched WHERE checkpoint_id = ?1 ORDER BY path")?;
        let rows = stmt
            .query_map([checkpoint_id], |row| {
                let kind: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, ChangeKind::from_byte(kind.as_bytes()[0])))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One row of `log` output: a checkpoint plus the count of sessions
    /// the link table associates with it.
    pub fn list_checkpoints(&self, limit: Option<usize>) -> DbResult<Vec<CheckpointLogEntry>> {
        let sql = "SELECT c.id, c.commit_sha, c.branch, c.author_email, c.timestamp, c.actor, c.agent_id, c.exported, \
                    (SELECT COUNT(*) FROM checkpoint_sessions cs WHERE cs.checkpoint_id = c.id) \
             FROM checkpoints c ORDER BY c.timestamp DESC LIMIT ?1";
        let limit = limit.unwrap_or(usize::MAX) as i64;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let actor: String = row.get(5)?;
                Ok(CheckpointLogEntry {
                    checkpoint: Checkpoint {
                        id: row.get(0)?,
                        commit_sha: row.get(1)?,
                        branch: row.get(2)?,
                        author_email: row.get(3)?,
                        timestamp: row.get(4)?,
                        actor: actor_from_str(&actor),
                        agent_id: row.get(6)?,
                        exported: row.get::<_, i64>(7)? != 0,
                    },
                    session_count: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Execute a caller-supplied SQL statement, rejecting anything that
    /// isn't a read. Backs the CLI's `query` escape hatch.
    pub fn query_readonly(&self, sql: &str) -> DbResult<Vec<Vec<String>>> {
        let trimmed = sql.trim_start().to_ascii_lowercase();
        if !trimmed.starts_with("select") && !trimmed.starts_with("with") && !trimmed.starts_with("pragma") {
            return Err(DbError::NotReadOnly);
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

fn actor_from_str(s: &str) -> ActorKind {
    match s {
        "agent" => ActorKind::Agent,
        _ => ActorKind::Human,
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        _ => Role::Human,
    }
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
