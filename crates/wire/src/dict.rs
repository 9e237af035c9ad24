// crates/wire/src/dict.rs
//! Four independent insertion-ordered string tables, shared across every
//! session/checkpoint frame so repeated session ids, emails, branches and
//! paths cost a few varint bytes instead of a full string each time.

use crate::error::WireError;
use byteorder::{ByteOrder, LittleEndian};

const MAGIC: &[u8; 6] = b"RKDICT";
const VERSION: u8 = 0x01;

/// The four disjoint namespaces, in the fixed wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Sessions,
    Branches,
    Emails,
    Paths,
}

const NAMESPACE_ORDER: [Namespace; 4] = [
    Namespace::Sessions,
    Namespace::Branches,
    Namespace::Emails,
    Namespace::Paths,
];

impl Namespace {
    fn index(self) -> usize {
        match self {
            Namespace::Sessions => 0,
            Namespace::Branches => 1,
            Namespace::Emails => 2,
            Namespace::Paths => 3,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Namespace::Sessions => "sessions",
            Namespace::Branches => "branches",
            Namespace::Emails => "emails",
            Namespace::Paths => "paths",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    entries: Vec<String>,
}

/// A string dictionary: insertion-ordered per namespace, indices stable
/// for the lifetime of the in-memory instance.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    tables: [Table; 4],
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `s`'s existing index in `ns`, or insert it and return the
    /// newly assigned one.
    pub fn lookup_or_add(&mut self, ns: Namespace, s: &str) -> u64 {
        let table = &mut self.tables[ns.index()];
        if let Some(pos) = table.entries.iter().position(|e| e == s) {
            return pos as u64;
        }
        table.entries.push(s.to_string());
        (table.entries.len() - 1) as u64
    }

    /// Resolve an index back to its string. Panics-free: returns an error
    /// for an out-of-range index rather than panicking, since indices can
    /// arrive from decoded (possibly corrupt) wire bytes.
    pub fn get(&self, ns: Namespace, index: u64) -> Result<&str, WireError> {
        let table = &self.tables[ns.index()];
        let index = usize::try_from(index).map_err(|_| WireError::DictIndexOutOfRange {
            namespace: ns.label(),
            index: u32::MAX,
            len: table.entries.len(),
        })?;
        table
            .entries
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| WireError::DictIndexOutOfRange {
                namespace: ns.label(),
                index: index as u32,
                len: table.entries.len(),
            })
    }

    pub fn len(&self, ns: Namespace) -> usize {
        self.tables[ns.index()].entries.len()
    }

    pub fn is_empty(&self) -> bool {
        NAMESPACE_ORDER.iter().all(|&ns| self.len(ns) == 0)
    }

    pub fn total_entries(&self) -> usize {
        NAMESPACE_ORDER.iter().map(|&ns| self.len(ns)).sum()
    }

    /// Serialize into the dictionary's wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(0); // flags, reserved
        out.extend_from_slice(&[0u8; 4]); // reserved

        for &ns in &NAMESPACE_ORDER {
            let table = &self.tables[ns.index()];
            let mut count_buf = [0u8; 4];
            LittleEndian::write_u32(&mut count_buf, table.entries.len() as u32);
            out.extend_from_slice(&count_buf);

            for entry in &table.entries {
                let bytes = entry.as_bytes();
                debug_assert!(bytes.len() <= u16::MAX as usize);
                let mut len_buf = [0u8; 2];
                LittleEndian::write_u16(&mut len_buf, bytes.len() as u16);
                out.extend_from_slice(&len_buf);
                out.extend_from_slice(bytes);
            }
        }

        out
    }

    /// Parse the wire representation produced by [`Dictionary::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < 12 {
            return Err(WireError::Eof { what: "dictionary header" });
        }
        if &buf[0..6] != MAGIC {
            return Err(WireError::BadMagic {
                container: "RKDICT",
                expected: MAGIC,
                found: buf[0..6].to_vec(),
            });
        }
        let version = buf[6];
        if version != VERSION {
            return Err(WireError::UnsupportedVersion {
                container: "RKDICT",
                version,
            });
        }

        let mut offset = 12;
        let mut dict = Dictionary::new();

        for &ns in &NAMESPACE_ORDER {
            let count_bytes = buf
                .get(offset..offset + 4)
                .ok_or(WireError::Eof { what: "namespace count" })?;
            let count = LittleEndian::read_u32(count_bytes);
            offset += 4;

            let table = &mut dict.tables[ns.index()];
            for _ in 0..count {
                let len_bytes = buf
                    .get(offset..offset + 2)
                    .ok_or(WireError::Eof { what: "entry length" })?;
                let len = LittleEndian::read_u16(len_bytes) as usize;
                offset += 2;

                let str_bytes = buf
                    .get(offset..offset + len)
                    .ok_or(WireError::Eof { what: "entry bytes" })?;
                let s = std::str::from_utf8(str_bytes)
                    .map_err(|_| WireError::InvalidUtf8 { what: "dictionary entry" })?;
                offset += len;

                table.entries.push(s.to_string());
            }
        }

        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_or_add_is_idempotent() {
        let mut dict = Dictionary::new();
        let a = dict.lookup_or_add(Namespace::Sessions, "sess-1");
        let b = dict.lookup_or_add(Namespace::Sessions, "sess-1");
        assert_eq!(a, b);
        assert_eq!(dict.lookup_or_add(Namespace::Sessions, "sess-2"), 1);
    }

    #[test]
    fn namespaces_are_disjoint() {
        let mut dict = Dictionary::new();
        let a = dict.lookup_or_add(Namespace::Sessions, "shared");
        let b = dict.lookup_or_add(Namespace::Paths, "shared");
        assert_eq!(a, 0);
        assert_eq!(b, 0);
        assert_eq!(dict.get(Namespace::Sessions, 0).unwrap(), "shared");
        assert_eq!(dict.get(Namespace::Paths, 0).unwrap(), "shared");
    }

    #[test]
    fn get_out_of_range_is_an_error() {
        let dict = Dictionary::new();
        assert!(dict.get(Namespace::Emails, 0).is_err());
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut dict = Dictionary::new();
        dict.lookup_or_add(Namespace::Sessions, "sess-1");
        dict.lookup_or_add(Namespace::Sessions, "sess-2");
        dict.lookup_or_add(Namespace::Branches, "main");
        dict.lookup_or_add(Namespace::Emails, "dev@example.com");
        dict.lookup_or_add(Namespace::Paths, "src/lib.rs");

        let encoded = dict.encode();
        let decoded = Dictionary::decode(&encoded).unwrap();

        assert_eq!(decoded.get(Namespace::Sessions, 0).unwrap(), "sess-1");
        assert_eq!(decoded.get(Namespace::Sessions, 1).unwrap(), "sess-2");
        assert_eq!(decoded.get(Namespace::Branches, 0).unwrap(), "main");
        assert_eq!(decoded.get(Namespace::Emails, 0).unwrap(), "dev@example.com");
        assert_eq!(decoded.get(Namespace::Paths, 0).unwrap(), "src/lib.rs");
        assert_eq!(decoded.total_entries(), dict.total_entries());
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let buf = vec![0u8; 20];
        assert!(matches!(
            Dictionary::decode(&buf),
            Err(WireError::BadMagic { .. })
        ));
    }

    #[test]
    fn empty_dictionary_round_trips() {
        let dict = Dictionary::new();
        let encoded = dict.encode();
        let decoded = Dictionary::decode(&encoded).unwrap();
        assert!(decoded.is_empty());
    }
}
