//! Inline SQL migrations for the derived index store.
//!
//! Unlike the data store, this schema is never hand-edited by a running
//! command: `index` always drops and recreates every table listed here
//! before repopulating (see [`crate::rebuild`]).

pub const MIGRATIONS: &[&str] = &[
    r#"
CREATE VIRTUAL TABLE IF NOT EXISTS turns_ft USING fts5(
    content,
    raw_content UNINDEXED,
    session_id UNINDEXED,
    turn_index UNINDEXED,
    role UNINDEXED,
    tokenize = 'porter'
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS tool_calls_index (
    session_id TEXT NOT NULL,
    call_order INTEGER NOT NULL,
    tool_name TEXT NOT NULL,
    file_path TEXT
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_tool_calls_index_session ON tool_calls_index(session_id);
"#,
    r#"
CREATE TABLE IF NOT EXISTS files_index (
    session_id TEXT NOT NULL,
    checkpoint_id TEXT,
    path TEXT NOT NULL,
    change_kind TEXT NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_files_index_session ON files_index(session_id);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_files_index_path ON files_index(path);
"#,
    r#"
CREATE TABLE IF NOT EXISTS session_facets (
    session_id TEXT PRIMARY KEY,
    author_email TEXT NOT NULL,
    actor TEXT NOT NULL,
    branch TEXT NOT NULL,
    captured_at INTEGER NOT NULL,
    checkpoint_id TEXT,
    commit_sha TEXT,
    turn_count INTEGER NOT NULL DEFAULT 0,
    tool_call_count INTEGER NOT NULL DEFAULT 0,
    file_count INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_session_facets_captured_at ON session_facets(captured_at);
"#,
    r#"
CREATE TABLE IF NOT EXISTS file_cooccurrence (
    path_a TEXT NOT NULL,
    path_b TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (path_a, path_b)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS embeddings (
    session_id TEXT PRIMARY KEY,
    dim INTEGER NOT NULL,
    vector BLOB NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS index_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    session_count INTEGER NOT NULL,
    turn_count INTEGER NOT NULL,
    embedding_dimension INTEGER NOT NULL,
    last_indexed_at INTEGER NOT NULL
);
"#,
    // Persisted LSA basis so a query in a later process can be projected
    // into the same embedding space a rebuild trained.
    r#"
CREATE TABLE IF NOT EXISTS lsa_model (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    vocab TEXT NOT NULL,
    idf BLOB NOT NULL,
    u_k BLOB NOT NULL,
    sigma_k BLOB NOT NULL,
    n_terms INTEGER NOT NULL,
    dimension INTEGER NOT NULL
);
"#,
];

/// Tables dropped and recreated by a rebuild, in drop order (reverse of
/// the population order in the spec).
pub const INDEX_TABLES: &[&str] = &[
    "lsa_model",
    "index_state",
    "embeddings",
    "file_cooccurrence",
    "session_facets",
    "files_index",
    "tool_calls_index",
    "turns_ft",
];

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
        conn.execute("INSERT INTO _migrations (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Drop every index table so a rebuild starts from a clean slate. Leaves
/// `_migrations` alone; `run_migrations` recreates the tables afterward.
pub fn drop_index_tables(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    for table in INDEX_TABLES {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
    }
    conn.execute("DELETE FROM _migrations", [])?;
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
    }

    #[test]
    fn drop_then_rebuild_recreates_tables() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        drop_index_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='session_facets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(exists, 1);
    }
}
