//! End-to-end: populate a minimal data store, rebuild the index, and
//! search it in both hybrid and filter modes.

use rekal_search::hybrid::SearchFilters;
use rekal_search::{rebuild, IndexStore, SearchMode};

fn seed_data_store(path: &std::path::Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE sessions (
            id TEXT PRIMARY KEY, content_hash TEXT, captured_at INTEGER,
            actor TEXT, agent_id TEXT, author_email TEXT, branch TEXT
        );
        CREATE TABLE turns (
            session_id TEXT, turn_index INTEGER, role TEXT, text TEXT, timestamp INTEGER
        );
        CREATE TABLE tool_calls (
            session_id TEXT, call_order INTEGER, tool_name TEXT, file_path TEXT, command_prefix TEXT
        );
        CREATE TABLE checkpoints (
            id TEXT PRIMARY KEY, commit_sha TEXT, branch TEXT, author_email TEXT,
            timestamp INTEGER, actor TEXT, agent_id TEXT, exported INTEGER
        );
        CREATE TABLE files_touched (checkpoint_id TEXT, path TEXT, change_kind TEXT);
        CREATE TABLE checkpoint_sessions (checkpoint_id TEXT, session_id TEXT);
        "#,
    )
    .unwrap();

    conn.execute(
        "INSERT INTO sessions VALUES ('test-session-1', 'h1', 100, 'human', NULL, 'alice@example.com', 'main')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO turns VALUES ('test-session-1', 0, 'human', 'fix the JWT expiry bug in the auth middleware', 100)",
        [],
    )
    .unwrap();

    conn.execute(
        "INSERT INTO sessions VALUES ('test-session-2', 'h2', 200, 'human', NULL, 'bob@example.com', 'main')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO turns VALUES ('test-session-2', 0, 'human', 'optimize the database connection pooling', 200)",
        [],
    )
    .unwrap();
}

#[test]
fn hybrid_search_surfaces_the_matching_session_first() {
    let data_dir = tempfile::tempdir().unwrap();
    let data_path = data_dir.path().join("data.db");
    seed_data_store(&data_path);

    let index = IndexStore::open_in_memory().unwrap();
    rebuild(&index, &data_path).unwrap();

    let lsa = index.load_lsa_model().unwrap();
    let output = rekal_search::search(&index, lsa.as_ref(), "JWT auth", &SearchFilters::default(), None).unwrap();

    assert_eq!(output.mode, SearchMode::Hybrid);
    assert!(!output.results.is_empty());
    assert_eq!(output.results[0].session_id, "test-session-1");
    assert!(output.results[0].snippet.to_lowercase().contains("jwt"));
}

#[test]
fn filter_mode_returns_all_sessions_ordered_by_recency() {
    let data_dir = tempfile::tempdir().unwrap();
    let data_path = data_dir.path().join("data.db");
    seed_data_store(&data_path);

    let index = IndexStore::open_in_memory().unwrap();
    rebuild(&index, &data_path).unwrap();

    let filters = SearchFilters {
        actor: Some("human".to_string()),
        ..Default::default()
    };
    let output = rekal_search::search(&index, None, "", &filters, None).unwrap();

    assert_eq!(output.mode, SearchMode::Filter);
    assert_eq!(output.total, 2);
    assert_eq!(output.results[0].session_id, "test-session-2");
}
