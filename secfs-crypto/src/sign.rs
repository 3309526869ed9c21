//! RSA-PSS/SHA-256 signatures.

use rsa::pss::{Signature, SigningKey, VerifyingKey};
use sha2::Sha256;
use signature::{RandomizedSigner, Verifier};

use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey};

/// An opaque RSA-PSS signature over some byte string.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBytes(pub Vec<u8>);

impl SignatureBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Sign `data` with `private`'s RSA-PSS/SHA-256 key.
pub fn sign(private: &PrivateKey, data: &[u8]) -> SignatureBytes {
    let signing_key = SigningKey::<Sha256>::new(private.0.clone());
    let mut rng = rand_core::OsRng;
    let sig = signing_key.sign_with_rng(&mut rng, data);
    SignatureBytes(sig.to_vec())
}

/// Verify `signature` over `data` against `public`. Never panics on
/// malformed signatures; returns `BadSignature` instead.
pub fn verify(public: &PublicKey, signature: &SignatureBytes, data: &[u8]) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::<Sha256>::new(public.0.clone());
    let sig = Signature::try_from(signature.0.as_slice()).map_err(|_| CryptoError::BadSignature)?;
    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::gen_keypair;

    #[test]
    fn roundtrip() {
        let (pk, sk) = gen_keypair();
        let msg = b"version struct bytes";
        let sig = sign(&sk, msg);
        assert!(verify(&pk, &sig, msg).is_ok());
    }

    #[test]
    fn single_bit_perturbation_fails() {
        let (pk, sk) = gen_keypair();
        let msg = b"version struct bytes";
        let mut sig = sign(&sk, msg);
        sig.0[0] ^= 0x01;
        assert!(verify(&pk, &sig, msg).is_err());
    }

    #[test]
    fn wrong_message_fails() {
        let (pk, sk) = gen_keypair();
        let sig = sign(&sk, b"message A");
        assert!(verify(&pk, &sig, b"message B").is_err());
    }
}
