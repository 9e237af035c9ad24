//! Inline SQL migrations for the Rekal data store.
//!
//! Simple inline migrations rather than an external migration framework:
//! the schema is small and owned entirely by this crate.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL UNIQUE,
    captured_at INTEGER NOT NULL,
    actor TEXT NOT NULL,
    agent_id TEXT,
    author_email TEXT NOT NULL,
    branch TEXT NOT NULL DEFAULT ''
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_sessions_captured_at ON sessions(captured_at);
"#,
    // Migration 2: turns
    r#"
CREATE TABLE IF NOT EXISTS turns (
    session_id TEXT NOT NULL REFERENCES sessions(id),
    turn_index INTEGER NOT NULL,
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    timestamp INTEGER,
    PRIMARY KEY (session_id, turn_index)
);
"#,
    // Migration 3: tool_calls
    r#"
CREATE TABLE IF NOT EXISTS tool_calls (
    session_id TEXT NOT NULL REFERENCES sessions(id),
    call_order INTEGER NOT NULL,
    tool_name TEXT NOT NULL,
    file_path TEXT,
    command_prefix TEXT,
    PRIMARY KEY (session_id, call_order)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_tool_calls_file_path ON tool_calls(file_path);
"#,
    // Migration 4: checkpoints
    r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    commit_sha TEXT NOT NULL,
    branch TEXT NOT NULL,
    author_email TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    actor TEXT NOT NULL,
    agent_id TEXT,
    exported INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_checkpoints_exported ON checkpoints(exported, timestamp);
"#,
    // Migration 5: files_touched
    r#"
CREATE TABLE IF NOT EXISTS files_touched (
    checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
    path TEXT NOT NULL,
    change_kind TEXT NOT NULL,
    PRIMARY KEY (checkpoint_id, path)
);
"#,
    // Migration 6: checkpoint_sessions link table
    r#"
CREATE TABLE IF NOT EXISTS checkpoint_sessions (
    checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
    session_id TEXT NOT NULL REFERENCES sessions(id),
    PRIMARY KEY (checkpoint_id, session_id)
);
"#,
    // Migration 7: checkpoint_state cache, keyed by transcript file path
    r#"
CREATE TABLE IF NOT EXISTS checkpoint_state (
    file_path TEXT PRIMARY KEY,
    size INTEGER NOT NULL,
    content_hash TEXT NOT NULL
);
"#,
];

/// Apply every migration not yet recorded in `_migrations`, in order.
/// Idempotent: re-running against an already-migrated connection is a no-op.
pub fn run_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL DEFAULT (unixepoch())
);
"#,
    )?;

    let applied: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version <= applied {
            continue;
        }
        conn.execute_batch(migration)?;
        conn.execute(
            "INSERT INTO _migrations (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn creates_expected_tables() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in [
            "sessions",
            "turns",
            "tool_calls",
            "checkpoints",
            "files_touched",
            "checkpoint_sessions",
            "checkpoint_state",
        ] {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "missing table {table}");
        }
    }

    #[test]
    fn content_hash_uniqueness_is_enforced() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, content_hash, captured_at, actor, author_email) \
             VALUES ('s1', 'abc', 0, 'human', 'a@example.com')",
            [],
        )
        .unwrap();

        let err = conn
            .execute(
                "INSERT INTO sessions (id, content_hash, captured_at, actor, author_email) \
                 VALUES ('s2', 'abc', 0, 'human', 'a@example.com')",
                [],
            )
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::SqliteFailure(_, _)));
    }
}
