//! Inode record and its canonical codec (spec.md §3, §4.3). Inodes are
//! never encrypted — directory traversal must never require a key the
//! traverser lacks (I1).

use secfs_crypto::Hash;

use crate::error::{Result, SecfsError};
use crate::wire::{check_format_tag, Decoder, Encoder, INODE_FORMAT_V1};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Dir = 0,
    File = 1,
}

impl Kind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Kind::Dir),
            1 => Some(Kind::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub kind: Kind,
    pub size: u64,
    pub encrypted: bool,
    pub executable: bool,
    pub ctime: u64,
    pub mtime: u64,
    pub blocks: Vec<Hash>,
}

impl Inode {
    pub fn new_empty(kind: Kind, encrypted: bool, executable: bool, now: u64) -> Self {
        Inode {
            kind,
            size: 0,
            encrypted,
            executable,
            ctime: now,
            mtime: now,
            blocks: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Dir
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u8(INODE_FORMAT_V1)
            .u8(self.kind as u8)
            .u64(self.size)
            .bool(self.encrypted)
            .bool(self.executable)
            .u64(self.ctime)
            .u64(self.mtime)
            .u32(self.blocks.len() as u32);
        for b in &self.blocks {
            enc.hash(b);
        }
        enc.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        check_format_tag(&mut dec, INODE_FORMAT_V1, SecfsError::CorruptInode)?;
        let kind = Kind::from_u8(dec.u8().ok_or(SecfsError::CorruptInode)?)
            .ok_or(SecfsError::CorruptInode)?;
        let size = dec.u64().ok_or(SecfsError::CorruptInode)?;
        let encrypted = dec.bool().ok_or(SecfsError::CorruptInode)?;
        let executable = dec.bool().ok_or(SecfsError::CorruptInode)?;
        let ctime = dec.u64().ok_or(SecfsError::CorruptInode)?;
        let mtime = dec.u64().ok_or(SecfsError::CorruptInode)?;
        let n = dec.u32().ok_or(SecfsError::CorruptInode)? as usize;
        let mut blocks = Vec::with_capacity(n);
        for _ in 0..n {
            blocks.push(dec.hash().ok_or(SecfsError::CorruptInode)?);
        }
        if !dec.at_end() {
            return Err(SecfsError::CorruptInode);
        }
        Ok(Inode {
            kind,
            size,
            encrypted,
            executable,
            ctime,
            mtime,
            blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secfs_crypto::sha256;

    #[test]
    fn roundtrip() {
        let mut inode = Inode::new_empty(Kind::File, true, false, 100);
        inode.blocks.push(sha256(b"a"));
        inode.blocks.push(sha256(b"b"));
        inode.size = 10;
        inode.mtime = 200;

        let encoded = inode.encode();
        let decoded = Inode::decode(&encoded).unwrap();
        assert_eq!(decoded.kind, Kind::File);
        assert_eq!(decoded.size, 10);
        assert!(decoded.encrypted);
        assert!(!decoded.executable);
        assert_eq!(decoded.ctime, 100);
        assert_eq!(decoded.mtime, 200);
        assert_eq!(decoded.blocks, inode.blocks);
    }

    #[test]
    fn deterministic_encoding() {
        let inode = Inode::new_empty(Kind::Dir, false, false, 1);
        assert_eq!(inode.encode(), inode.encode());
    }

    #[test]
    fn truncated_buffer_is_corrupt() {
        let inode = Inode::new_empty(Kind::File, false, false, 1);
        let encoded = inode.encode();
        assert!(matches!(
            Inode::decode(&encoded[..encoded.len() - 1]),
            Err(SecfsError::CorruptInode)
        ));
    }

    #[test]
    fn bad_format_tag_is_corrupt() {
        let mut encoded = Inode::new_empty(Kind::File, false, false, 1).encode();
        encoded[0] = 0xff;
        assert!(matches!(Inode::decode(&encoded), Err(SecfsError::CorruptInode)));
    }
}
