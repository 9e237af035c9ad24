// crates/wire/src/body.rs
//! The body container: a header followed by an append-only sequence of
//! zstd-compressed frames, each wrapped in a fixed 10-byte envelope.

use crate::error::WireError;
use byteorder::{ByteOrder, LittleEndian};

const BODY_MAGIC: &[u8; 7] = b"RKLBODY";
const BODY_VERSION: u8 = 0x01;
pub const BODY_HEADER_LEN: usize = 9;
pub const ENVELOPE_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Session,
    Checkpoint,
    Meta,
}

impl FrameType {
    pub fn as_byte(self) -> u8 {
        match self {
            FrameType::Session => 0x01,
            FrameType::Checkpoint => 0x02,
            FrameType::Meta => 0x03,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            0x01 => Ok(FrameType::Session),
            0x02 => Ok(FrameType::Checkpoint),
            0x03 => Ok(FrameType::Meta),
            other => Err(WireError::UnknownFrameType(other)),
        }
    }
}

/// A decoded frame's position and decompressed payload.
#[derive(Debug, Clone)]
pub struct ScannedFrame {
    pub offset: usize,
    pub frame_type: FrameType,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub payload: Vec<u8>,
}

/// An empty body: just the 9-byte header.
pub fn new_body() -> Vec<u8> {
    let mut body = Vec::with_capacity(BODY_HEADER_LEN);
    body.extend_from_slice(BODY_MAGIC);
    body.push(BODY_VERSION);
    body.push(0);
    body
}

fn verify_header(body: &[u8]) -> Result<(), WireError> {
    if body.len() < BODY_HEADER_LEN {
        return Err(WireError::Eof { what: "body header" });
    }
    if &body[0..7] != BODY_MAGIC {
        return Err(WireError::BadMagic {
            container: "RKLBODY",
            expected: BODY_MAGIC,
            found: body[0..7].to_vec(),
        });
    }
    let version = body[7];
    if version != BODY_VERSION {
        return Err(WireError::UnsupportedVersion {
            container: "RKLBODY",
            version,
        });
    }
    Ok(())
}

/// Compress `payload` with zstd at the default level, using `dict` as a
/// preset dictionary when present.
pub fn compress(payload: &[u8], dict: Option<&[u8]>) -> Result<Vec<u8>, WireError> {
    let level = zstd::DEFAULT_COMPRESSION_LEVEL;
    let compressed = match dict {
        Some(d) => {
            let mut encoder = zstd::stream::Encoder::with_dictionary(Vec::new(), level, d)?;
            std::io::Write::write_all(&mut encoder, payload)?;
            encoder.finish()?
        }
        None => zstd::stream::encode_all(payload, level)?,
    };
    Ok(compressed)
}

fn decompress(
    compressed: &[u8],
    uncompressed_len: u32,
    dict: Option<&[u8]>,
) -> Result<Vec<u8>, WireError> {
    let decompressed = match dict {
        Some(d) => {
            let mut decoder = zstd::stream::Decoder::with_dictionary(compressed, d)?;
            let mut out = Vec::with_capacity(uncompressed_len as usize);
            std::io::Read::read_to_end(&mut decoder, &mut out)?;
            out
        }
        None => zstd::stream::decode_all(compressed)?,
    };
    if decompressed.len() != uncompressed_len as usize {
        return Err(WireError::LengthMismatch {
            declared: uncompressed_len,
            actual: decompressed.len(),
        });
    }
    Ok(decompressed)
}

/// Append one frame: compress `payload`, emit its envelope, then the
/// compressed bytes. Never rewrites existing bytes — callers rely on
/// this for the append-only body invariant.
pub fn append_frame(
    body: &mut Vec<u8>,
    frame_type: FrameType,
    payload: &[u8],
    dict: Option<&[u8]>,
) -> Result<(), WireError> {
    let compressed = compress(payload, dict)?;
    let compressed_len = u32::try_from(compressed.len()).map_err(|_| WireError::VarintOverflow)?;
    let uncompressed_len = u32::try_from(payload.len()).map_err(|_| WireError::VarintOverflow)?;

    body.push(frame_type.as_byte());
    body.push(0x01); // envelope version
    let mut len_buf = [0u8; 4];
    LittleEndian::write_u32(&mut len_buf, compressed_len);
    body.extend_from_slice(&len_buf);
    LittleEndian::write_u32(&mut len_buf, uncompressed_len);
    body.extend_from_slice(&len_buf);
    body.extend_from_slice(&compressed);

    Ok(())
}

/// Forward-scan every frame in `body`, decompressing each payload.
///
/// An unknown frame type or a frame claiming `uncompressed_len == 0`
/// fails fast — the encoder must never emit either.
pub fn scan_frames(body: &[u8], dict: Option<&[u8]>) -> Result<Vec<ScannedFrame>, WireError> {
    verify_header(body)?;
    let mut offset = BODY_HEADER_LEN;
    let mut frames = Vec::new();

    while offset < body.len() {
        let envelope = body
            .get(offset..offset + ENVELOPE_LEN)
            .ok_or(WireError::Eof { what: "frame envelope" })?;

        let frame_type = FrameType::from_byte(envelope[0])?;
        let _envelope_version = envelope[1];
        let compressed_len = LittleEndian::read_u32(&envelope[2..6]);
        let uncompressed_len = LittleEndian::read_u32(&envelope[6..10]);

        if uncompressed_len == 0 {
            return Err(WireError::LengthMismatch {
                declared: 0,
                actual: 0,
            });
        }

        let payload_start = offset + ENVELOPE_LEN;
        let payload_end = payload_start + compressed_len as usize;
        let compressed = body
            .get(payload_start..payload_end)
            .ok_or(WireError::Eof { what: "frame payload" })?;

        let payload = decompress(compressed, uncompressed_len, dict)?;

        frames.push(ScannedFrame {
            offset,
            frame_type,
            compressed_len,
            uncompressed_len,
            payload,
        });

        offset = payload_end;
    }

    Ok(frames)
}

/// Number of frames currently in `body`, without decompressing payloads.
/// Used by the export engine to compute the meta frame's `n_frames`.
pub fn count_frames(body: &[u8]) -> Result<usize, WireError> {
    verify_header(body)?;
    let mut offset = BODY_HEADER_LEN;
    let mut count = 0;

    while offset < body.len() {
        let envelope = body
            .get(offset..offset + ENVELOPE_LEN)
            .ok_or(WireError::Eof { what: "frame envelope" })?;
        let compressed_len = LittleEndian::read_u32(&envelope[2..6]);
        offset += ENVELOPE_LEN + compressed_len as usize;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_scans_to_no_frames() {
        let body = new_body();
        let frames = scan_frames(&body, None).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn append_and_scan_round_trips_payload() {
        let mut body = new_body();
        append_frame(&mut body, FrameType::Session, b"hello session", None).unwrap();
        append_frame(&mut body, FrameType::Checkpoint, b"hello checkpoint", None).unwrap();

        let frames = scan_frames(&body, None).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_type, FrameType::Session);
        assert_eq!(frames[0].payload, b"hello session");
        assert_eq!(frames[1].frame_type, FrameType::Checkpoint);
        assert_eq!(frames[1].payload, b"hello checkpoint");
    }

    #[test]
    fn append_is_a_byte_prefix_preserving_operation() {
        let mut body = new_body();
        append_frame(&mut body, FrameType::Session, b"first", None).unwrap();
        let prefix = body.clone();

        append_frame(&mut body, FrameType::Session, b"second", None).unwrap();
        assert!(body.starts_with(&prefix));
    }

    #[test]
    fn scan_rejects_bad_magic() {
        let body = vec![0u8; 20];
        assert!(matches!(scan_frames(&body, None), Err(WireError::BadMagic { .. })));
    }

    #[test]
    fn scan_rejects_truncated_trailing_bytes() {
        let mut body = new_body();
        append_frame(&mut body, FrameType::Session, b"payload", None).unwrap();
        body.truncate(body.len() - 2);
        assert!(scan_frames(&body, None).is_err());
    }

    #[test]
    fn count_frames_matches_scan_length() {
        let mut body = new_body();
        append_frame(&mut body, FrameType::Session, b"a", None).unwrap();
        append_frame(&mut body, FrameType::Meta, b"b", None).unwrap();
        assert_eq!(count_frames(&body).unwrap(), 2);
        assert_eq!(scan_frames(&body, None).unwrap().len(), 2);
    }

    #[test]
    fn compression_with_shared_dictionary_round_trips() {
        let dict = b"session checkpoint meta repeated tokens for training".to_vec();
        let mut body = new_body();
        append_frame(&mut body, FrameType::Session, b"session checkpoint payload", Some(&dict))
            .unwrap();

        let frames = scan_frames(&body, Some(&dict)).unwrap();
        assert_eq!(frames[0].payload, b"session checkpoint payload");
    }

    #[test]
    fn frame_type_round_trips_through_byte() {
        for t in [FrameType::Session, FrameType::Checkpoint, FrameType::Meta] {
            assert_eq!(FrameType::from_byte(t.as_byte()).unwrap(), t);
        }
        assert!(FrameType::from_byte(0x42).is_err());
    }
}
