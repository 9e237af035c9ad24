//! End-to-end: discover a transcript, capture + anchor it as a
//! checkpoint, export it to a wire body, then replay that body into a
//! second store via self-sync and confirm it lands byte-for-byte the
//! same as the original capture.

use std::path::Path;
use std::process::Command;

use rekal_db::{checkpoint, export, import};
use rekal_wire::Dictionary;

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(repo)
        .status()
        .expect("git must be on PATH for this test");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo(repo: &Path) {
    git(repo, &["init", "-q"]);
    git(repo, &["config", "user.email", "dev@example.com"]);
    git(repo, &["config", "user.name", "Dev"]);
    std::fs::write(repo.join("README.md"), "hello\n").unwrap();
    git(repo, &["add", "README.md"]);
    git(repo, &["commit", "-q", "-m", "initial"]);
}

fn write_transcript(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let lines = [
        r#"{"type":"user","timestamp":"2024-01-01T00:00:00Z","gitBranch":"main","message":{"content":"fix the parser"}}"#,
        r#"{"type":"assistant","timestamp":"2024-01-01T00:00:05Z","message":{"content":[{"type":"text","text":"done, ran the tests"},{"type":"tool_use","name":"Bash","input":{"command":"cargo test"}}]}}"#,
    ];
    std::fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
}

#[tokio::test]
async fn captures_exports_and_self_syncs_a_session() {
    let repo_dir = tempfile::tempdir().unwrap();
    init_repo(repo_dir.path());

    let discovery_dir = tempfile::tempdir().unwrap();
    write_transcript(discovery_dir.path(), "session-1.jsonl");

    let store = rekal_db::Store::open_in_memory().unwrap();

    let captured = checkpoint::run(&store, repo_dir.path(), discovery_dir.path(), "dev@example.com")
        .await
        .unwrap();
    assert_eq!(captured, 1);
    assert_eq!(store.count_sessions().unwrap(), 1);
    assert_eq!(store.count_checkpoints().unwrap(), 1);

    let session_id = store
        .query_readonly("SELECT id FROM sessions")
        .unwrap()
        .into_iter()
        .next()
        .unwrap()
        .into_iter()
        .next()
        .unwrap();

    // Re-running checkpoint against an unchanged file is a no-op.
    let again = checkpoint::run(&store, repo_dir.path(), discovery_dir.path(), "dev@example.com")
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(store.count_sessions().unwrap(), 1);

    let mut body = rekal_wire::new_body();
    let mut dict = Dictionary::new();
    let exported = export::run(&store, &mut body, &mut dict, "dev@example.com").unwrap();
    assert_eq!(exported, 1);

    let frames = rekal_wire::scan_frames(&body, None).unwrap();
    assert_eq!(frames.len(), 3); // session, checkpoint, meta

    let replayed = rekal_db::Store::open_in_memory().unwrap();
    let stats = import::run_self_sync(&replayed, &body, &dict).unwrap();
    assert_eq!(stats.sessions_imported, 1);
    assert_eq!(stats.checkpoints_imported, 1);
    assert!(replayed.session_exists_by_id(&session_id).unwrap());
    assert_eq!(replayed.turns_for_session(&session_id).unwrap().len(), 2);
}
