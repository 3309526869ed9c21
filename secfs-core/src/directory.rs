//! Directory payload codec and the `add` operation shared by
//! `create`/`mkdir`'s `.`/`..` population and `link` (spec.md §3, §4.5).

use crate::error::{Result, SecfsError};
use crate::types::{Principal, I};
use crate::wire::{check_format_tag, Decoder, Encoder, DIR_FORMAT_V1};

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub child: I,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub entries: Vec<DirEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Directory { entries: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&I> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.child)
    }

    /// Rejects a duplicate `name` with `NameExists`, grounded in
    /// `secfs/store/tree.py::add`'s existing-name scan.
    pub fn add(&mut self, name: &str, child: I) -> Result<()> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(SecfsError::NameExists);
        }
        self.entries.push(DirEntry {
            name: name.to_string(),
            child,
        });
        Ok(())
    }

    /// A fresh directory with `.` and `..` populated — root is its own
    /// parent (spec.md §3, resolved Open Question in SPEC_FULL.md §9).
    pub fn with_dot_entries(self_i: I, parent_i: I) -> Self {
        let mut dir = Directory::new();
        dir.add(".", self_i).expect(". cannot already exist in a fresh directory");
        dir.add("..", parent_i).expect(".. cannot already exist in a fresh directory");
        dir
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u8(DIR_FORMAT_V1).u32(self.entries.len() as u32);
        for e in &self.entries {
            enc.bytes(e.name.as_bytes());
            enc.principal(&e.child.p());
            enc.u64(e.child.n().expect("directory entries reference only allocated I"));
        }
        enc.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        check_format_tag(&mut dec, DIR_FORMAT_V1, SecfsError::CorruptDirectory)?;
        let n = dec.u32().ok_or(SecfsError::CorruptDirectory)? as usize;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            let name_bytes = dec.bytes().ok_or(SecfsError::CorruptDirectory)?;
            let name = String::from_utf8(name_bytes).map_err(|_| SecfsError::CorruptDirectory)?;
            let p: Principal = dec.principal().ok_or(SecfsError::CorruptDirectory)?;
            let inumber = dec.u64().ok_or(SecfsError::CorruptDirectory)?;
            entries.push(DirEntry {
                name,
                child: I::allocated(p, inumber),
            });
        }
        if !dec.at_end() {
            return Err(SecfsError::CorruptDirectory);
        }
        Ok(Directory { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_entries_roundtrip() {
        let root = I::allocated(Principal::user(0), 0);
        let dir = Directory::with_dot_entries(root, root);
        let encoded = dir.encode();
        let decoded = Directory::decode(&encoded).unwrap();
        assert_eq!(decoded.get(".").unwrap(), &root);
        assert_eq!(decoded.get("..").unwrap(), &root);
    }

    #[test]
    fn duplicate_name_rejected() {
        let root = I::allocated(Principal::user(0), 0);
        let mut dir = Directory::with_dot_entries(root, root);
        let child = I::allocated(Principal::user(0), 1);
        assert!(matches!(dir.add(".", child), Err(SecfsError::NameExists)));
    }

    #[test]
    fn truncated_buffer_is_corrupt() {
        let root = I::allocated(Principal::user(0), 0);
        let dir = Directory::with_dot_entries(root, root);
        let encoded = dir.encode();
        assert!(matches!(
            Directory::decode(&encoded[..encoded.len() - 1]),
            Err(SecfsError::CorruptDirectory)
        ));
    }
}
