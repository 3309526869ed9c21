//! Error type for the crypto layer.

use core::fmt;

/// Failure modes exposed by `secfs-crypto`. These map directly onto the
/// integrity-error kinds a caller in `secfs-core` needs to distinguish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A signature did not verify against the claimed public key.
    BadSignature,
    /// A symmetric or public-key ciphertext failed to authenticate or decode.
    BadCiphertext,
    /// The private key material needed for an operation is not registered.
    KeyAbsent,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::BadCiphertext => write!(f, "ciphertext is malformed or not authentic"),
            Self::KeyAbsent => write!(f, "required key material is not registered"),
        }
    }
}

impl std::error::Error for CryptoError {}
