//! SHA-256 content hashing.

use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 content hash, naming an immutable block on the server.
///
/// Used both as "ihash" (names an inode/directory/itable blob) and
/// "ihandle" (names an itable blob specifically) in the surrounding spec.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash an arbitrary byte blob. This is what the server commits to: callers
/// that want the hash of ciphertext must hash the ciphertext, not the
/// plaintext (see `BlockStoreClient::put`).
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Hash(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = sha256(b"hello world");
        let b = sha256(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn sensitive_to_input() {
        let a = sha256(b"hello world");
        let b = sha256(b"hello worle");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrip() {
        let h = sha256(b"roundtrip");
        let hex = h.to_hex();
        let back = Hash::from_hex(&hex).unwrap();
        assert_eq!(h, back);
    }
}
