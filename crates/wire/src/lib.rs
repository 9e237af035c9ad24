// crates/wire/src/lib.rs
pub mod body;
pub mod dict;
pub mod error;
pub mod frames;
pub mod varint;

pub use body::{append_frame, count_frames, compress, new_body, scan_frames, FrameType, ScannedFrame};
pub use dict::{Dictionary, Namespace};
pub use error::WireError;
pub use frames::{
    decode_checkpoint, decode_meta, decode_session, encode_checkpoint, encode_meta,
    encode_session, WireCheckpoint, WireMeta, WirePath, WireSession, WireToolCall, WireTurn,
    ZERO_SHA_PLACEHOLDER,
};
pub use varint::{read_uvarint, write_uvarint};
