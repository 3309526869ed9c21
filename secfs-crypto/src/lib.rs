//! Crypto primitives for `secfs-core`'s trust layer.
//!
//! Algorithms: SHA-256 hashing, RSA-2048 with PSS/SHA-256 signatures and
//! OAEP/SHA-256 key wrapping, and AES-256-GCM authenticated symmetric
//! encryption for file/directory content. Signing and content encryption
//! are domain-separated by construction — they live in different modules
//! and never share a key type.

mod error;
mod hash;
mod keys;
mod pke;
mod sign;
mod sym;

pub use error::CryptoError;
pub use hash::{sha256, Hash};
pub use keys::{gen_keypair, PrivateKey, PublicKey};
pub use pke::{pk_decrypt, pk_encrypt};
pub use sign::{sign, verify, SignatureBytes};
pub use sym::{gen_sym_key, sym_decrypt, sym_encrypt, SymKey};
