//! The `BlockServer` collaborator interface (spec.md §4.2, §6) and a
//! content-addressed `BlockStoreClient` wrapper over it, plus an
//! in-memory `BlockServer` for tests/dev tooling — never a production
//! server (spec.md §1 Non-goals: "the RPC server").

use std::collections::HashMap;
use std::sync::RwLock;

use secfs_crypto::{sha256, sym_decrypt, sym_encrypt, Hash, SymKey};

use crate::error::{Result, SecfsError};
use crate::types::User;
use crate::wire::VersionStructDict;

/// The out-of-scope RPC server's interface, as seen by the client. Methods
/// are synchronous/blocking: spec.md §5 models every server touchpoint as
/// blocking I/O under a per-operation exclusive lock, not an async
/// runtime.
pub trait BlockServer: Send + Sync {
    fn store(&self, blob: &[u8]) -> Result<Hash>;
    fn read(&self, hash: &Hash) -> Result<Vec<u8>>;
    fn get_vsl(&self) -> Result<HashMap<String, VersionStructDict>>;
    fn commit(&self, user: User, vs: VersionStructDict) -> Result<()>;
}

/// Grounded in `citadel-keystore::storage::InMemoryBackend`: a pair of
/// `RwLock`-guarded maps standing in for the untrusted server during
/// tests. Blocks are addressed by the hash of exactly what was stored,
/// matching the real server's obligation in spec.md §4.2.
#[derive(Default)]
pub struct InMemoryBlockServer {
    blocks: RwLock<HashMap<Hash, Vec<u8>>>,
    vsl: RwLock<HashMap<String, VersionStructDict>>,
}

impl InMemoryBlockServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockServer for InMemoryBlockServer {
    fn store(&self, blob: &[u8]) -> Result<Hash> {
        let h = sha256(blob);
        self.blocks
            .write()
            .map_err(|_| SecfsError::ServerUnavailable)?
            .insert(h, blob.to_vec());
        Ok(h)
    }

    fn read(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.blocks
            .read()
            .map_err(|_| SecfsError::ServerUnavailable)?
            .get(hash)
            .cloned()
            .ok_or(SecfsError::CorruptBlock)
    }

    fn get_vsl(&self) -> Result<HashMap<String, VersionStructDict>> {
        Ok(self
            .vsl
            .read()
            .map_err(|_| SecfsError::ServerUnavailable)?
            .clone())
    }

    fn commit(&self, user: User, vs: VersionStructDict) -> Result<()> {
        self.vsl
            .write()
            .map_err(|_| SecfsError::ServerUnavailable)?
            .insert(user.to_string(), vs);
        Ok(())
    }
}

/// Wraps a `BlockServer` with the optional symmetric-encryption step from
/// spec.md §4.2: `put` encrypts before forwarding (when a key is given),
/// `get` decrypts after fetching, and both verify the returned hash
/// matches what was requested.
pub struct BlockStoreClient<S: BlockServer + ?Sized> {
    server: std::sync::Arc<S>,
}

impl<S: BlockServer + ?Sized> BlockStoreClient<S> {
    pub fn new(server: std::sync::Arc<S>) -> Self {
        BlockStoreClient { server }
    }

    pub fn put(&self, blob: &[u8], key: Option<&SymKey>) -> Result<Hash> {
        let to_store = match key {
            Some(k) => sym_encrypt(k, blob)?,
            None => blob.to_vec(),
        };
        self.server.store(&to_store)
    }

    pub fn get(&self, hash: &Hash, key: Option<&SymKey>) -> Result<Vec<u8>> {
        let raw = self.server.read(hash)?;
        if sha256(&raw) != *hash {
            return Err(SecfsError::CorruptBlock);
        }
        match key {
            Some(k) => Ok(sym_decrypt(k, &raw)?),
            None => Ok(raw),
        }
    }

    pub fn server(&self) -> &S {
        &self.server
    }
}
