//! Authenticated symmetric encryption (AES-256-GCM) for file and directory
//! contents. Domain-separated from signatures by construction: this module
//! never touches an RSA key, and `sign.rs` never touches a `SymKey`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use getrandom::getrandom;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// A 256-bit symmetric content key, wrapped per-recipient via RSA-OAEP
/// (see `pke.rs`) and stored unwrapped only in memory.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SymKey([u8; 32]);

impl SymKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Generate a fresh random content key (`gen_sym_key()` in the spec).
pub fn gen_sym_key() -> SymKey {
    let mut bytes = [0u8; 32];
    getrandom(&mut bytes).expect("OS RNG unavailable");
    SymKey(bytes)
}

/// Encrypt `data` under `key`. Output is `nonce || ciphertext_with_tag`;
/// the nonce is random per call, never reused (a fresh block is produced
/// on every write per spec.md's §4.5 single-new-block write semantics, so
/// key/nonce reuse cannot occur within one content key's lifetime as long
/// as random nonces are used).
pub fn sym_encrypt(key: &SymKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| CryptoError::BadCiphertext)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom(&mut nonce_bytes).map_err(|_| CryptoError::BadCiphertext)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: data, aad: &[] })
        .map_err(|_| CryptoError::BadCiphertext)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data previously produced by [`sym_encrypt`]. Fails
/// `BadCiphertext` if the buffer is too short, or authentication fails.
pub fn sym_decrypt(key: &SymKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::BadCiphertext);
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| CryptoError::BadCiphertext)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &[] })
        .map_err(|_| CryptoError::BadCiphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = gen_sym_key();
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let ct = sym_encrypt(&key, plaintext).unwrap();
        let pt = sym_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let key = gen_sym_key();
        let other = gen_sym_key();
        let ct = sym_encrypt(&key, b"secret").unwrap();
        assert!(sym_decrypt(&other, &ct).is_err());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let key = gen_sym_key();
        let ct = sym_encrypt(&key, b"secret").unwrap();
        assert!(sym_decrypt(&key, &ct[..NONCE_LEN]).is_err());
    }

    #[test]
    fn ciphertext_has_no_plaintext_substring() {
        let key = gen_sym_key();
        let plaintext = b"the quick brown fox jumps over the lazy dog 0123456789";
        let ct = sym_encrypt(&key, plaintext).unwrap();
        assert!(!ct.windows(8).any(|w| plaintext.windows(8).any(|p| p == w)));
    }
}
