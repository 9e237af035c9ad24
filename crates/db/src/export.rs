//! The export engine: walk unexported checkpoints oldest-first and
//! append their sessions, then the checkpoint itself, as frames in the
//! shared body. Finishes with a single meta frame summarizing the body
//! as a whole, then marks every checkpoint it touched as exported.
//!
//! Append-only and retry-safe: a checkpoint is only marked exported
//! after its frames are in `body`, so a crash mid-run just means the
//! next export pass re-appends the same checkpoint (and its sessions,
//! since nothing was marked yet) rather than losing it.

use rekal_types::ToolCode;
use rekal_wire::{
    append_frame, count_frames, encode_checkpoint, encode_meta, encode_session, Dictionary,
    FrameType, WireCheckpoint, WireMeta, WirePath, WireSession, WireToolCall, WireTurn,
    ZERO_SHA_PLACEHOLDER,
};

use crate::error::DbResult;
use crate::store::Store;

/// Append every unexported checkpoint (and its sessions) to `body`,
/// interning strings into `dict` as it goes, then append one meta
/// frame and mark every touched checkpoint exported.
///
/// Returns the number of checkpoints exported; `0` means there was
/// nothing new to ship.
pub fn run(store: &Store, body: &mut Vec<u8>, dict: &mut Dictionary, exporter_email: &str) -> DbResult<usize> {
    let checkpoint_ids = store.query_unexported_checkpoints()?;
    if checkpoint_ids.is_empty() {
        tracing::debug!("export: nothing unexported");
        return Ok(0);
    }
    tracing::info!("export: appending {} checkpoint(s)", checkpoint_ids.len());

    for checkpoint_id in &checkpoint_ids {
        export_checkpoint(store, body, dict, checkpoint_id)?;
    }

    let frame_count = count_frames(body)?;
    let meta = WireMeta {
        format_version: 1,
        email: exporter_email.to_string(),
        checkpoint_sha_placeholder: ZERO_SHA_PLACEHOLDER.to_string(),
        ts: chrono::Utc::now().timestamp() as u32,
        n_sessions: store.count_sessions()?,
        n_checkpoints: store.count_checkpoints()?,
        n_frames: (frame_count + 1) as u32,
        n_dict_entries: dict.total_entries() as u32,
    };
    let meta_payload = encode_meta(&meta, dict)?;
    append_frame(body, FrameType::Meta, &meta_payload, None)?;

    for checkpoint_id in &checkpoint_ids {
        store.mark_exported(checkpoint_id)?;
    }

    Ok(checkpoint_ids.len())
}

fn export_checkpoint(store: &Store, body: &mut Vec<u8>, dict: &mut Dictionary, checkpoint_id: &str) -> DbResult<()> {
    let checkpoint = match store.get_checkpoint(checkpoint_id)? {
        Some(cp) => cp,
        None => return Ok(()), // vanished between listing and export; nothing to do
    };
    let session_ids = store.sessions_for_checkpoint(checkpoint_id)?;

    for session_id in &session_ids {
        export_session(store, body, dict, session_id)?;
    }

    let files = store.files_for_checkpoint(checkpoint_id)?;
    let wire_checkpoint = WireCheckpoint {
        git_sha: checkpoint.commit_sha,
        branch: checkpoint.branch,
        email: checkpoint.author_email,
        ts: checkpoint.timestamp as u32,
        actor: checkpoint.actor,
        agent_id: checkpoint.agent_id,
        session_ids,
        files,
    };
    let payload = encode_checkpoint(&wire_checkpoint, dict)?;
    append_frame(body, FrameType::Checkpoint, &payload, None)?;

    Ok(())
}

fn export_session(store: &Store, body: &mut Vec<u8>, dict: &mut Dictionary, session_id: &str) -> DbResult<()> {
    let session = match store.get_session(session_id)? {
        Some(s) => s,
        None => return Ok(()),
    };
    let turns = store.turns_for_session(session_id)?;
    let tool_calls = store.tool_calls_for_session(session_id)?;

    let mut wire_turns = Vec::with_capacity(turns.len());
    let mut prior_ts: Option<i64> = None;
    for turn in &turns {
        let ts_delta = match (prior_ts, turn.timestamp) {
            (Some(prior), Some(ts)) if ts >= prior => (ts - prior) as u64,
            _ => 0,
        };
        wire_turns.push(WireTurn {
            role: turn.role,
            ts_delta,
            branch: session.branch.clone(),
            text: turn.text.clone(),
        });
        if turn.timestamp.is_some() {
            prior_ts = turn.timestamp;
        }
    }

    let wire_tool_calls = tool_calls
        .iter()
        .map(|call| WireToolCall {
            tool_code: ToolCode::from_name(&call.tool_name),
            path: match &call.file_path {
                Some(p) => WirePath::DictRef(p.clone()),
                None => WirePath::Null,
            },
            command_prefix: call.command_prefix.as_deref().unwrap_or("").as_bytes().to_vec(),
        })
        .collect();

    let wire_session = WireSession {
        session_id: session.id,
        captured_at: session.captured_at as u32,
        email: session.author_email,
        actor: session.actor,
        agent_id: session.agent_id,
        turns: wire_turns,
        tool_calls: wire_tool_calls,
    };
    let payload = encode_session(&wire_session, dict)?;
    append_frame(body, FrameType::Session, &payload, None)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekal_types::{ActorKind, Role};
    use rekal_wire::{decode_checkpoint, decode_session, scan_frames};

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_session(
                "sess-1",
                "hash-1",
                1_700_000_000,
                ActorKind::Human,
                None,
                "dev@example.com",
                "main",
            )
            .unwrap();
        store.insert_turn("sess-1", 0, Role::Human, "fix the bug", Some(1_700_000_000)).unwrap();
        store.insert_turn("sess-1", 1, Role::Assistant, "done", Some(1_700_000_010)).unwrap();
        store.insert_tool_call("sess-1", 0, "Bash", None, Some("cargo test")).unwrap();

        store
            .insert_checkpoint("cp-1", &"a".repeat(40), "main", "dev@example.com", 1_700_000_020, ActorKind::Human, None)
            .unwrap();
        store.link_checkpoint_session("cp-1", "sess-1").unwrap();
        store.insert_file_touched("cp-1", "src/lib.rs", rekal_types::ChangeKind::Modified).unwrap();

        store
    }

    #[test]
    fn export_appends_session_checkpoint_and_meta_frames() {
        let store = seeded_store();
        let mut body = rekal_wire::new_body();
        let mut dict = Dictionary::new();

        let exported = run(&store, &mut body, &mut dict, "dev@example.com").unwrap();
        assert_eq!(exported, 1);

        let frames = scan_frames(&body, None).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].frame_type, FrameType::Session);
        assert_eq!(frames[1].frame_type, FrameType::Checkpoint);
        assert_eq!(frames[2].frame_type, FrameType::Meta);

        let decoded_session = decode_session(&frames[0].payload, &dict).unwrap();
        assert_eq!(decoded_session.session_id, "sess-1");
        assert_eq!(decoded_session.turns[1].ts_delta, 10);

        let decoded_checkpoint = decode_checkpoint(&frames[1].payload, &dict).unwrap();
        assert_eq!(decoded_checkpoint.session_ids, vec!["sess-1".to_string()]);

        assert!(store.query_unexported_checkpoints().unwrap().is_empty());
    }

    #[test]
    fn export_with_nothing_unexported_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        let mut body = rekal_wire::new_body();
        let mut dict = Dictionary::new();

        let exported = run(&store, &mut body, &mut dict, "dev@example.com").unwrap();
        assert_eq!(exported, 0);
        assert_eq!(body, rekal_wire::new_body());
    }

    #[test]
    fn re_running_export_after_a_successful_run_is_a_no_op() {
        let store = seeded_store();
        let mut body = rekal_wire::new_body();
        let mut dict = Dictionary::new();

        run(&store, &mut body, &mut dict, "dev@example.com").unwrap();
        let prefix = body.clone();

        let second = run(&store, &mut body, &mut dict, "dev@example.com").unwrap();
        assert_eq!(second, 0);
        assert_eq!(body, prefix);
    }
}
