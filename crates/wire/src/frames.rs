// crates/wire/src/frames.rs
//! Codecs for the three payload kinds carried in body frames: session
//! (`RKLS`), checkpoint (`RKLC`), and meta (`RKLM`). Each shares the
//! 4-byte-magic + version preamble.

use crate::dict::{Dictionary, Namespace};
use crate::error::WireError;
use crate::varint::{read_uvarint, write_uvarint};
use byteorder::{ByteOrder, LittleEndian};
use rekal_types::{ActorKind, ChangeKind, Role, ToolCode};

const SESSION_MAGIC: &[u8; 4] = b"RKLS";
const CHECKPOINT_MAGIC: &[u8; 4] = b"RKLC";
const META_MAGIC: &[u8; 4] = b"RKLM";
const PAYLOAD_VERSION: u8 = 0x01;
const GIT_SHA_LEN: usize = 40;

fn check_magic(buf: &[u8], expected: &'static [u8; 4], container: &'static str) -> Result<(), WireError> {
    let found = buf
        .get(0..4)
        .ok_or(WireError::Eof { what: "payload magic" })?;
    if found != expected.as_slice() {
        return Err(WireError::BadMagic {
            container,
            expected,
            found: found.to_vec(),
        });
    }
    Ok(())
}

fn write_u32_le(out: &mut Vec<u8>, v: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, v);
    out.extend_from_slice(&buf);
}

fn read_u32_le(buf: &[u8], offset: &mut usize) -> Result<u32, WireError> {
    let bytes = buf
        .get(*offset..*offset + 4)
        .ok_or(WireError::Eof { what: "u32 field" })?;
    *offset += 4;
    Ok(LittleEndian::read_u32(bytes))
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    write_uvarint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

fn read_len_prefixed<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a [u8], WireError> {
    let len = read_uvarint(buf, offset)? as usize;
    let bytes = buf
        .get(*offset..*offset + len)
        .ok_or(WireError::Eof { what: "length-prefixed bytes" })?;
    *offset += len;
    Ok(bytes)
}

// ---------------------------------------------------------------------
// Session payload
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WireTurn {
    pub role: Role,
    /// Seconds since the previous turn's absolute timestamp; 0 for the
    /// first turn or when either timestamp is missing.
    pub ts_delta: u64,
    pub branch: String,
    pub text: String,
}

/// Where a tool call's path argument came from, per the path-flag byte.
#[derive(Debug, Clone, PartialEq)]
pub enum WirePath {
    DictRef(String),
    Inline(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireToolCall {
    pub tool_code: ToolCode,
    pub path: WirePath,
    pub command_prefix: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireSession {
    pub session_id: String,
    pub captured_at: u32,
    pub email: String,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub turns: Vec<WireTurn>,
    pub tool_calls: Vec<WireToolCall>,
}

pub fn encode_session(session: &WireSession, dict: &mut Dictionary) -> Result<Vec<u8>, WireError> {
    let n_turns = u8::try_from(session.turns.len()).map_err(|_| WireError::TooManyEntries {
        what: "turns",
        count: session.turns.len(),
    })?;
    let n_tool_calls =
        u8::try_from(session.tool_calls.len()).map_err(|_| WireError::TooManyEntries {
            what: "tool calls",
            count: session.tool_calls.len(),
        })?;

    let mut out = Vec::new();
    out.extend_from_slice(SESSION_MAGIC);
    out.push(PAYLOAD_VERSION);
    out.push(0); // dict-flags, reserved
    out.push(n_turns);
    out.push(n_tool_calls);

    let session_ref = dict.lookup_or_add(Namespace::Sessions, &session.session_id);
    write_uvarint(session_ref, &mut out);
    write_u32_le(&mut out, session.captured_at);
    let email_ref = dict.lookup_or_add(Namespace::Emails, &session.email);
    write_uvarint(email_ref, &mut out);
    out.push(session.actor.as_byte());
    if session.actor == ActorKind::Agent {
        let agent_id = session.agent_id.as_deref().unwrap_or("");
        let agent_ref = dict.lookup_or_add(Namespace::Sessions, agent_id);
        write_uvarint(agent_ref, &mut out);
    }

    for turn in &session.turns {
        out.push(turn.role.as_byte());
        write_uvarint(turn.ts_delta, &mut out);
        let branch_ref = dict.lookup_or_add(Namespace::Branches, &turn.branch);
        write_uvarint(branch_ref, &mut out);
        write_len_prefixed(&mut out, turn.text.as_bytes());
    }

    for call in &session.tool_calls {
        out.push(call.tool_code.as_byte());
        match &call.path {
            WirePath::DictRef(p) => {
                out.push(0);
                let path_ref = dict.lookup_or_add(Namespace::Paths, p);
                write_uvarint(path_ref, &mut out);
            }
            WirePath::Inline(p) => {
                out.push(1);
                write_len_prefixed(&mut out, p.as_bytes());
            }
            WirePath::Null => {
                out.push(2);
            }
        }
        write_len_prefixed(&mut out, &call.command_prefix);
    }

    Ok(out)
}

pub fn decode_session(buf: &[u8], dict: &Dictionary) -> Result<WireSession, WireError> {
    check_magic(buf, SESSION_MAGIC, "RKLS")?;
    let _version = *buf.get(4).ok_or(WireError::Eof { what: "session version" })?;
    let _dict_flags = *buf.get(5).ok_or(WireError::Eof { what: "session dict-flags" })?;
    let n_turns = *buf.get(6).ok_or(WireError::Eof { what: "n_turns" })?;
    let n_tool_calls = *buf.get(7).ok_or(WireError::Eof { what: "n_tool_calls" })?;

    let mut offset = 8;
    let session_ref = read_uvarint(buf, &mut offset)?;
    let session_id = dict.get(Namespace::Sessions, session_ref)?.to_string();
    let captured_at = read_u32_le(buf, &mut offset)?;
    let email_ref = read_uvarint(buf, &mut offset)?;
    let email = dict.get(Namespace::Emails, email_ref)?.to_string();
    let actor_byte = *buf.get(offset).ok_or(WireError::Eof { what: "actor byte" })?;
    offset += 1;
    let actor = ActorKind::from_byte(actor_byte);

    let agent_id = if actor == ActorKind::Agent {
        let agent_ref = read_uvarint(buf, &mut offset)?;
        Some(dict.get(Namespace::Sessions, agent_ref)?.to_string())
    } else {
        None
    };

    let mut turns = Vec::with_capacity(n_turns as usize);
    for _ in 0..n_turns {
        let role_byte = *buf.get(offset).ok_or(WireError::Eof { what: "turn role" })?;
        offset += 1;
        let role = Role::from_byte(role_byte);
        let ts_delta = read_uvarint(buf, &mut offset)?;
        let branch_ref = read_uvarint(buf, &mut offset)?;
        let branch = dict.get(Namespace::Branches, branch_ref)?.to_string();
        let text_bytes = read_len_prefixed(buf, &mut offset)?;
        let text = std::str::from_utf8(text_bytes)
            .map_err(|_| WireError::InvalidUtf8 { what: "turn text" })?
            .to_string();
        turns.push(WireTurn { role, ts_delta, branch, text });
    }

    let mut tool_calls = Vec::with_capacity(n_tool_calls as usize);
    for _ in 0..n_tool_calls {
        let code_byte = *buf.get(offset).ok_or(WireError::Eof { what: "tool code" })?;
        offset += 1;
        let tool_code = ToolCode::from_byte(code_byte);

        let path_flag = *buf.get(offset).ok_or(WireError::Eof { what: "path flag" })?;
        offset += 1;
        let path = match path_flag {
            0 => {
                let path_ref = read_uvarint(buf, &mut offset)?;
                WirePath::DictRef(dict.get(Namespace::Paths, path_ref)?.to_string())
            }
            1 => {
                let bytes = read_len_prefixed(buf, &mut offset)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| WireError::InvalidUtf8 { what: "inline path" })?;
                WirePath::Inline(s.to_string())
            }
            _ => WirePath::Null,
        };

        let command_prefix = read_len_prefixed(buf, &mut offset)?.to_vec();
        tool_calls.push(WireToolCall { tool_code, path, command_prefix });
    }

    Ok(WireSession {
        session_id,
        captured_at,
        email,
        actor,
        agent_id,
        turns,
        tool_calls,
    })
}

// ---------------------------------------------------------------------
// Checkpoint payload
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WireCheckpoint {
    pub git_sha: String,
    pub branch: String,
    pub email: String,
    pub ts: u32,
    pub actor: ActorKind,
    pub agent_id: Option<String>,
    pub session_ids: Vec<String>,
    pub files: Vec<(String, ChangeKind)>,
}

pub fn encode_checkpoint(cp: &WireCheckpoint, dict: &mut Dictionary) -> Result<Vec<u8>, WireError> {
    if cp.git_sha.len() != GIT_SHA_LEN || !cp.git_sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WireError::InvalidUtf8 { what: "git sha (must be 40 ascii hex)" });
    }
    let n_files = u8::try_from(cp.files.len()).map_err(|_| WireError::TooManyEntries {
        what: "checkpoint files",
        count: cp.files.len(),
    })?;

    let mut out = Vec::new();
    out.extend_from_slice(CHECKPOINT_MAGIC);
    out.push(PAYLOAD_VERSION);
    out.push(n_files);

    out.extend_from_slice(cp.git_sha.as_bytes());
    let branch_ref = dict.lookup_or_add(Namespace::Branches, &cp.branch);
    write_uvarint(branch_ref, &mut out);
    let email_ref = dict.lookup_or_add(Namespace::Emails, &cp.email);
    write_uvarint(email_ref, &mut out);
    write_u32_le(&mut out, cp.ts);
    out.push(cp.actor.as_byte());
    if cp.actor == ActorKind::Agent {
        let agent_id = cp.agent_id.as_deref().unwrap_or("");
        let agent_ref = dict.lookup_or_add(Namespace::Sessions, agent_id);
        write_uvarint(agent_ref, &mut out);
    }

    write_uvarint(cp.session_ids.len() as u64, &mut out);
    for session_id in &cp.session_ids {
        let session_ref = dict.lookup_or_add(Namespace::Sessions, session_id);
        write_uvarint(session_ref, &mut out);
    }

    for (path, change) in &cp.files {
        let path_ref = dict.lookup_or_add(Namespace::Paths, path);
        write_uvarint(path_ref, &mut out);
        out.push(change.as_byte());
    }

    Ok(out)
}

pub fn decode_checkpoint(buf: &[u8], dict: &Dictionary) -> Result<WireCheckpoint, WireError> {
    check_magic(buf, CHECKPOINT_MAGIC, "RKLC")?;
    let _version = *buf.get(4).ok_or(WireError::Eof { what: "checkpoint version" })?;
    let n_files = *buf.get(5).ok_or(WireError::Eof { what: "n_files" })?;

    let mut offset = 6;
    let sha_bytes = buf
        .get(offset..offset + GIT_SHA_LEN)
        .ok_or(WireError::Eof { what: "git sha" })?;
    let git_sha = std::str::from_utf8(sha_bytes)
        .map_err(|_| WireError::InvalidUtf8 { what: "git sha" })?
        .to_string();
    offset += GIT_SHA_LEN;

    let branch_ref = read_uvarint(buf, &mut offset)?;
    let branch = dict.get(Namespace::Branches, branch_ref)?.to_string();
    let email_ref = read_uvarint(buf, &mut offset)?;
    let email = dict.get(Namespace::Emails, email_ref)?.to_string();
    let ts = read_u32_le(buf, &mut offset)?;
    let actor_byte = *buf.get(offset).ok_or(WireError::Eof { what: "actor byte" })?;
    offset += 1;
    let actor = ActorKind::from_byte(actor_byte);

    let agent_id = if actor == ActorKind::Agent {
        let agent_ref = read_uvarint(buf, &mut offset)?;
        Some(dict.get(Namespace::Sessions, agent_ref)?.to_string())
    } else {
        None
    };

    let n_sessions = read_uvarint(buf, &mut offset)?;
    let mut session_ids = Vec::with_capacity(n_sessions as usize);
    for _ in 0..n_sessions {
        let session_ref = read_uvarint(buf, &mut offset)?;
        session_ids.push(dict.get(Namespace::Sessions, session_ref)?.to_string());
    }

    let mut files = Vec::with_capacity(n_files as usize);
    for _ in 0..n_files {
        let path_ref = read_uvarint(buf, &mut offset)?;
        let path = dict.get(Namespace::Paths, path_ref)?.to_string();
        let change_byte = *buf.get(offset).ok_or(WireError::Eof { what: "change kind" })?;
        offset += 1;
        files.push((path, ChangeKind::from_byte(change_byte)));
    }

    Ok(WireCheckpoint {
        git_sha,
        branch,
        email,
        ts,
        actor,
        agent_id,
        session_ids,
        files,
    })
}

// ---------------------------------------------------------------------
// Meta payload
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WireMeta {
    pub format_version: u8,
    pub email: String,
    /// 40-char placeholder field; this implementation writes the all-zero
    /// SHA since a meta frame summarizes the body as a whole and isn't
    /// anchored to one particular checkpoint (see DESIGN.md).
    pub checkpoint_sha_placeholder: String,
    pub ts: u32,
    pub n_sessions: u32,
    pub n_checkpoints: u32,
    pub n_frames: u32,
    pub n_dict_entries: u32,
}

pub const ZERO_SHA_PLACEHOLDER: &str = "0000000000000000000000000000000000000000";

pub fn encode_meta(meta: &WireMeta, dict: &mut Dictionary) -> Result<Vec<u8>, WireError> {
    if meta.checkpoint_sha_placeholder.len() != GIT_SHA_LEN {
        return Err(WireError::InvalidUtf8 { what: "checkpoint sha placeholder (must be 40 bytes)" });
    }

    let mut out = Vec::new();
    out.extend_from_slice(META_MAGIC);
    out.push(PAYLOAD_VERSION);

    out.push(meta.format_version);
    let email_ref = dict.lookup_or_add(Namespace::Emails, &meta.email);
    write_uvarint(email_ref, &mut out);
    out.extend_from_slice(meta.checkpoint_sha_placeholder.as_bytes());
    write_u32_le(&mut out, meta.ts);
    write_u32_le(&mut out, meta.n_sessions);
    write_u32_le(&mut out, meta.n_checkpoints);
    write_u32_le(&mut out, meta.n_frames);
    write_u32_le(&mut out, meta.n_dict_entries);

    Ok(out)
}

pub fn decode_meta(buf: &[u8], dict: &Dictionary) -> Result<WireMeta, WireError> {
    check_magic(buf, META_MAGIC, "RKLM")?;
    let mut offset = 5; // magic (4) + version (1)

    let format_version = *buf.get(offset).ok_or(WireError::Eof { what: "format version" })?;
    offset += 1;
    let email_ref = read_uvarint(buf, &mut offset)?;
    let email = dict.get(Namespace::Emails, email_ref)?.to_string();

    let sha_bytes = buf
        .get(offset..offset + GIT_SHA_LEN)
        .ok_or(WireError::Eof { what: "checkpoint sha placeholder" })?;
    let checkpoint_sha_placeholder = std::str::from_utf8(sha_bytes)
        .map_err(|_| WireError::InvalidUtf8 { what: "checkpoint sha placeholder" })?
        .to_string();
    offset += GIT_SHA_LEN;

    let ts = read_u32_le(buf, &mut offset)?;
    let n_sessions = read_u32_le(buf, &mut offset)?;
    let n_checkpoints = read_u32_le(buf, &mut offset)?;
    let n_frames = read_u32_le(buf, &mut offset)?;
    let n_dict_entries = read_u32_le(buf, &mut offset)?;

    Ok(WireMeta {
        format_version,
        email,
        checkpoint_sha_placeholder,
        ts,
        n_sessions,
        n_checkpoints,
        n_frames,
        n_dict_entries,
    })
}
