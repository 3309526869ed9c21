//! Canonical byte encoding primitives shared by `inode.rs`, `directory.rs`,
//! `itable.rs` and `vsl.rs`, plus the `serde`-based RPC wire shapes from
//! spec.md §6.
//!
//! Every on-disk blob category gets a one-byte format tag at its head
//! (Design Notes §9), so a future format change can be distinguished from
//! corruption rather than silently misparsed.

use serde::{Deserialize, Serialize};

use secfs_crypto::Hash;

use crate::error::{Result, SecfsError};
use crate::types::Principal;

pub const INODE_FORMAT_V1: u8 = 0x01;
pub const DIR_FORMAT_V1: u8 = 0x01;
pub const ITABLE_FORMAT_V1: u8 = 0x01;
pub const VS_FORMAT_V1: u8 = 0x01;

/// Append-only byte buffer with length-prefixed field helpers. Every
/// encoder in this crate writes through this type so the field order and
/// prefix widths stay uniform across blob categories.
#[derive(Default)]
pub struct Encoder(Vec<u8>);

impl Encoder {
    pub fn new() -> Self {
        Encoder(Vec::new())
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(if v { 1 } else { 0 })
    }

    /// A `u32`-length-prefixed byte string.
    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.u32(b.len() as u32);
        self.0.extend_from_slice(b);
        self
    }

    pub fn hash(&mut self, h: &Hash) -> &mut Self {
        self.0.extend_from_slice(h.as_bytes());
        self
    }

    pub fn principal(&mut self, p: &Principal) -> &mut Self {
        self.bytes(p.to_string().as_bytes())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

/// A cursor over an encoded buffer. Every read can fail — any of these
/// failures is surfaced by the caller as the appropriate `Corrupt*`
/// variant, never a panic.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn u8(&mut self) -> Option<u8> {
        let v = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    pub fn u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    }

    pub fn u64(&mut self) -> Option<u64> {
        let bytes = self.buf.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }

    pub fn bool(&mut self) -> Option<bool> {
        Some(self.u8()? != 0)
    }

    pub fn bytes(&mut self) -> Option<Vec<u8>> {
        let len = self.u32()? as usize;
        let b = self.buf.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(b.to_vec())
    }

    pub fn hash(&mut self) -> Option<Hash> {
        let bytes = self.buf.get(self.pos..self.pos + 32)?;
        self.pos += 32;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash::from_bytes(array))
    }

    pub fn principal(&mut self) -> Option<Principal> {
        let raw = self.bytes()?;
        let s = String::from_utf8(raw).ok()?;
        Principal::parse(&s)
    }

    /// True once every byte has been consumed — callers use this to reject
    /// buffers with trailing garbage after a structurally valid decode.
    pub fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

pub fn check_format_tag(decoder: &mut Decoder<'_>, expected: u8, err: SecfsError) -> Result<()> {
    match decoder.u8() {
        Some(tag) if tag == expected => Ok(()),
        _ => Err(err),
    }
}

/// Wire form of `VersionStruct` for `BlockServer::get_vsl`/`commit`
/// (spec.md §6). `ihandles`/`versions` are `Vec<(String, _)>` rather than
/// a map so field order on the wire is exactly what `bytes()` covers
/// on the receiving end after re-sorting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionStructDict {
    #[serde(rename = "__class__")]
    pub class: String,
    pub principal: String,
    pub ihandles: Vec<(String, String)>,
    pub versions: Vec<(String, u64)>,
    pub signature: String,
}

impl VersionStructDict {
    pub fn class_tag() -> String {
        "VersionStruct".to_string()
    }
}
