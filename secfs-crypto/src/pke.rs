//! RSA-OAEP/SHA-256 public-key encryption, used to wrap per-itable
//! symmetric content keys under each authorized user's public key.

use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey};

/// Encrypt a small payload (in practice: a 32-byte symmetric key) under
/// `public`. RSA-OAEP on a 2048-bit key bounds the plaintext to well under
/// a content key's size, which is all this is ever used for.
pub fn pk_encrypt(public: &PublicKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand_core::OsRng;
    public
        .0
        .encrypt(&mut rng, Oaep::new::<Sha256>(), data)
        .map_err(|_| CryptoError::BadCiphertext)
}

/// Decrypt a payload previously produced by [`pk_encrypt`].
pub fn pk_decrypt(private: &PrivateKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key: &RsaPrivateKey = &private.0;
    key.decrypt(Oaep::new::<Sha256>(), data)
        .map_err(|_| CryptoError::BadCiphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::gen_keypair;

    #[test]
    fn roundtrip() {
        let (pk, sk) = gen_keypair();
        let key = [7u8; 32];
        let wrapped = pk_encrypt(&pk, &key).unwrap();
        let unwrapped = pk_decrypt(&sk, &wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let (pk, sk) = gen_keypair();
        let key = [7u8; 32];
        let mut wrapped = pk_encrypt(&pk, &key).unwrap();
        wrapped[0] ^= 0xff;
        assert!(pk_decrypt(&sk, &wrapped).is_err());
    }
}
