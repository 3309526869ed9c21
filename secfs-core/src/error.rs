//! The flat error enum surfaced to callers, covering every kind in
//! spec.md §7 plus the crypto layer.

use std::fmt;

use secfs_crypto::CryptoError;

#[derive(Debug)]
pub enum SecfsError {
    PermissionDenied,
    NoSuchInumber,
    NoSuchName,
    NotADirectory,
    NameExists,
    BadSignature,
    BadCiphertext,
    CorruptBlock,
    CorruptInode,
    CorruptDirectory,
    CorruptMapping,
    ForkDetected,
    ServerUnavailable,
    KeyAbsent,
    Crypto(CryptoError),
}

impl fmt::Display for SecfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecfsError::PermissionDenied => write!(f, "permission denied"),
            SecfsError::NoSuchInumber => write!(f, "no such inumber"),
            SecfsError::NoSuchName => write!(f, "no such name"),
            SecfsError::NotADirectory => write!(f, "not a directory"),
            SecfsError::NameExists => write!(f, "name already exists"),
            SecfsError::BadSignature => write!(f, "signature verification failed"),
            SecfsError::BadCiphertext => write!(f, "ciphertext authentication failed"),
            SecfsError::CorruptBlock => write!(f, "block hash mismatch"),
            SecfsError::CorruptInode => write!(f, "inode encoding is corrupt"),
            SecfsError::CorruptDirectory => write!(f, "directory encoding is corrupt"),
            SecfsError::CorruptMapping => write!(f, "itable mapping is corrupt"),
            SecfsError::ForkDetected => write!(f, "server presented a forked VSL"),
            SecfsError::ServerUnavailable => write!(f, "block server unavailable"),
            SecfsError::KeyAbsent => write!(f, "no private key registered for user"),
            SecfsError::Crypto(e) => write!(f, "crypto error: {}", e),
        }
    }
}

impl std::error::Error for SecfsError {}

impl From<CryptoError> for SecfsError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::BadSignature => SecfsError::BadSignature,
            CryptoError::BadCiphertext => SecfsError::BadCiphertext,
            CryptoError::KeyAbsent => SecfsError::KeyAbsent,
        }
    }
}

pub type Result<T> = std::result::Result<T, SecfsError>;
