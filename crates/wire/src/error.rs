// crates/wire/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unexpected end of buffer while reading {what}")]
    Eof { what: &'static str },

    #[error("bad magic bytes for {container}: expected {expected:?}, got {found:?}")]
    BadMagic {
        container: &'static str,
        expected: &'static [u8],
        found: Vec<u8>,
    },

    #[error("unsupported format version {version} for {container}")]
    UnsupportedVersion { container: &'static str, version: u8 },

    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    #[error("too many {what}: {count} exceeds the wire format's u8 count field")]
    TooManyEntries { what: &'static str, count: usize },

    #[error("unknown frame type byte {0:#04x}")]
    UnknownFrameType(u8),

    #[error("frame length mismatch: envelope declared {declared}, decompressed to {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("string index {index} out of range for namespace {namespace} (len {len})")]
    DictIndexOutOfRange {
        namespace: &'static str,
        index: u32,
        len: usize,
    },

    #[error("invalid utf-8 in {what}")]
    InvalidUtf8 { what: &'static str },

    #[error("zstd error: {0}")]
    Zstd(#[from] std::io::Error),
}
