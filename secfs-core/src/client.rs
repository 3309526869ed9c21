//! The `Client` handle: consolidates the global mutable state the
//! original design scattered across module-level variables (`keys`,
//! `usermap`, `groupmap`, `itables`, `vsl`, `server`) into one struct
//! owned by the embedding frontend (spec.md §9 Design Notes).
//!
//! `Client` is `!Sync` by construction — spec.md §5 guarantees operation
//! serialization externally (one exclusive server-side lock per op), so
//! no internal locking is layered on top.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use secfs_crypto::PrivateKey;
use tracing::instrument;

use crate::block::{BlockServer, BlockStoreClient};
use crate::directory::DirEntry;
use crate::error::{Result, SecfsError};
use crate::inode::Kind;
use crate::types::{GroupMap, Principal, User, UserMap, I};
use crate::wire::{Decoder, Encoder};
use crate::{fs, vsl::VslEngine};

/// Inode `ctime`/`mtime` source. `chrono` rather than a raw
/// `SystemTime::duration_since` so the value is explicitly UTC and the
/// timestamp can't go negative under a pre-1970 clock.
fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// `/.users` codec: count-prefixed `(user, PEM public key)` pairs.
fn encode_users(usermap: &UserMap) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.u32(usermap.len() as u32);
    for (u, pk) in usermap {
        enc.principal(&u.principal());
        enc.bytes(pk.to_pem()?.as_bytes());
    }
    Ok(enc.into_vec())
}

fn decode_users(buf: &[u8]) -> Result<UserMap> {
    let mut dec = Decoder::new(buf);
    let n = dec.u32().ok_or(SecfsError::CorruptMapping)? as usize;
    let mut map = UserMap::new();
    for _ in 0..n {
        let p = dec.principal().ok_or(SecfsError::CorruptMapping)?;
        let Principal::User(uid) = p else {
            return Err(SecfsError::CorruptMapping);
        };
        let pem_bytes = dec.bytes().ok_or(SecfsError::CorruptMapping)?;
        let pem = String::from_utf8(pem_bytes).map_err(|_| SecfsError::CorruptMapping)?;
        let pk = secfs_crypto::PublicKey::from_pem(&pem)?;
        map.insert(User(uid), pk);
    }
    if !dec.at_end() {
        return Err(SecfsError::CorruptMapping);
    }
    Ok(map)
}

/// `/.groups` codec: count-prefixed `(group, [user, ...])` pairs.
fn encode_groups(groupmap: &GroupMap) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(groupmap.len() as u32);
    for (g, members) in groupmap {
        enc.principal(&Principal::Group(*g));
        enc.u32(members.len() as u32);
        for m in members {
            enc.principal(&m.principal());
        }
    }
    enc.into_vec()
}

fn decode_groups(buf: &[u8]) -> Result<GroupMap> {
    let mut dec = Decoder::new(buf);
    let n = dec.u32().ok_or(SecfsError::CorruptMapping)? as usize;
    let mut map = GroupMap::new();
    for _ in 0..n {
        let p = dec.principal().ok_or(SecfsError::CorruptMapping)?;
        let Principal::Group(gid) = p else {
            return Err(SecfsError::CorruptMapping);
        };
        let m = dec.u32().ok_or(SecfsError::CorruptMapping)? as usize;
        let mut members = Vec::with_capacity(m);
        for _ in 0..m {
            let mp = dec.principal().ok_or(SecfsError::CorruptMapping)?;
            let Principal::User(uid) = mp else {
                return Err(SecfsError::CorruptMapping);
            };
            members.push(User(uid));
        }
        map.insert(gid, members);
    }
    if !dec.at_end() {
        return Err(SecfsError::CorruptMapping);
    }
    Ok(map)
}

/// The FuseFront-facing handle. One `Client` per mounted principal
/// session; tests instantiate several independently against one shared
/// `BlockServer` (spec.md §9).
pub struct Client<S: BlockServer + ?Sized> {
    store: BlockStoreClient<S>,
    engine: VslEngine,
    keys: HashMap<User, PrivateKey>,
    usermap: UserMap,
    groupmap: GroupMap,
    root: Option<I>,
}

impl<S: BlockServer + ?Sized> Client<S> {
    pub fn new(server: Arc<S>) -> Self {
        Client {
            store: BlockStoreClient::new(server),
            engine: VslEngine::new(),
            keys: HashMap::new(),
            usermap: UserMap::new(),
            groupmap: GroupMap::new(),
            root: None,
        }
    }

    /// Registers a user's private key with this client (`user-<uid>-key.pem`
    /// on disk, spec.md §6) — required before that user can decrypt
    /// content or sign a commit.
    pub fn register_key(&mut self, user: User, key: PrivateKey) {
        self.keys.insert(user, key);
    }

    pub fn set_root(&mut self, root: I) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<I> {
        self.root
    }

    fn priv_key(&self, user: User) -> Option<&PrivateKey> {
        self.keys.get(&user)
    }

    /// Bootstrap-only local keyring (this client's own registered keys'
    /// public halves) used by `pre` to verify signatures before `/.users`
    /// has ever been read (spec.md §4.6 step 2 "or, during bootstrap, in a
    /// local keyring").
    fn bootstrap_keyring(&self) -> UserMap {
        self.keys.iter().map(|(u, sk)| (*u, sk.public_key())).collect()
    }

    /// Seeds trusted public keys and group membership ahead of the first
    /// `pre`. A client's own registered private keys are enough to verify
    /// its own past commits (`bootstrap_keyring`), but verifying another
    /// principal's first VS requires that principal's public key from
    /// somewhere — in deployment, an out-of-band registry distributed at
    /// mount time, the same role `known_hosts` plays for SSH.
    pub fn seed_trust(&mut self, usermap: UserMap, groupmap: GroupMap) {
        self.usermap = usermap;
        self.groupmap = groupmap;
    }

    /// `init(owner, users_blob, groups_blob) → root_I`. Does not push a VS.
    /// Decodes `users_blob`/`groups_blob` into `self.usermap`/`self.groupmap`
    /// *before* building the root — otherwise the owner's own itable would
    /// be created with no wrapped content key, since itable creation wraps
    /// per `usermap` at the moment the itable is first touched, not later.
    #[instrument(skip(self, users_blob, groups_blob))]
    pub fn init(&mut self, owner: User, users_blob: &[u8], groups_blob: &[u8]) -> Result<I> {
        self.usermap = decode_users(users_blob)?;
        self.groupmap = decode_groups(groups_blob)?;
        let root = fs::init(
            &mut self.engine,
            &self.store,
            owner,
            &self.usermap,
            &self.groupmap,
            users_blob,
            groups_blob,
            now(),
        )?;
        self.root = Some(root);
        Ok(root)
    }

    /// Convenience bootstrap that encodes the acting user's own
    /// registered public key as the sole entry of a fresh `/.users`, and
    /// an empty `/.groups`.
    pub fn init_single_user(&mut self, owner: User) -> Result<I> {
        let pubkey = self
            .priv_key(owner)
            .ok_or(SecfsError::KeyAbsent)?
            .public_key();
        let mut usermap = UserMap::new();
        usermap.insert(owner, pubkey);
        let users_blob = encode_users(&usermap)?;
        let groups_blob = encode_groups(&GroupMap::new());
        self.init(owner, &users_blob, &groups_blob)
    }

    /// `pre(user)` (spec.md §4.6): fetch+verify the VSL, rebuild itables,
    /// then reparse `/.users`/`/.groups` through ordinary `read`.
    #[instrument(skip(self))]
    pub fn pre(&mut self, user: User) -> Result<()> {
        let bootstrap = self.bootstrap_keyring();
        self.engine.pre(user, &self.store, &self.usermap, &bootstrap, &self.groupmap)?;

        if let Some(root) = self.root {
            if let Ok(entries) = self.readdir_raw(root, 0, user) {
                if let Some(users_i) = find_entry(&entries, ".users") {
                    if let Ok(bytes) = fs::read_all(&self.engine, &self.store, user, users_i, self.priv_key(user), &self.groupmap) {
                        if let Ok(map) = decode_users(&bytes) {
                            self.usermap = map;
                        }
                    }
                }
                if let Some(groups_i) = find_entry(&entries, ".groups") {
                    if let Ok(bytes) = fs::read_all(&self.engine, &self.store, user, groups_i, self.priv_key(user), &self.groupmap) {
                        if let Ok(map) = decode_groups(&bytes) {
                            self.groupmap = map;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// `post(push)` (spec.md §4.6).
    #[instrument(skip(self))]
    pub fn post(&mut self, user: User, push: bool) -> Result<()> {
        let key = self.priv_key(user).ok_or(SecfsError::KeyAbsent)?;
        self.engine.post(user, push, key, &self.store, &self.groupmap)
    }

    fn read_raw(&self, user: User, i: I, off: usize, size: usize) -> Result<Vec<u8>> {
        fs::read(&self.engine, &self.store, user, i, off, size, self.priv_key(user), &self.groupmap)
    }

    fn readdir_raw(&self, i: I, off: usize, user: User) -> Result<Vec<(DirEntry, usize)>> {
        fs::readdir(&self.engine, &self.store, i, off, user, self.priv_key(user), &self.groupmap)
    }

    pub fn create(
        &mut self,
        parent_i: I,
        name: &str,
        acting_user: User,
        owner_principal: Principal,
        encrypted: bool,
        kind: Kind,
    ) -> Result<I> {
        fs::create(
            &mut self.engine,
            &self.store,
            parent_i,
            name,
            acting_user,
            owner_principal,
            encrypted,
            kind,
            self.priv_key(acting_user),
            &self.usermap,
            &self.groupmap,
            now(),
        )
    }

    pub fn mkdir(
        &mut self,
        parent_i: I,
        name: &str,
        acting_user: User,
        owner_principal: Principal,
        encrypted: bool,
    ) -> Result<I> {
        self.create(parent_i, name, acting_user, owner_principal, encrypted, Kind::Dir)
    }

    pub fn read(&self, user: User, i: I, off: usize, size: usize) -> Result<Vec<u8>> {
        self.read_raw(user, i, off, size)
    }

    pub fn write(&mut self, user: User, i: I, off: usize, buf: &[u8]) -> Result<usize> {
        fs::write(
            &mut self.engine,
            &self.store,
            user,
            i,
            off,
            buf,
            self.priv_key(user),
            &self.groupmap,
            &self.usermap,
            now(),
        )
    }

    pub fn readdir(&self, i: I, off: usize, user: User) -> Result<Vec<(DirEntry, usize)>> {
        self.readdir_raw(i, off, user)
    }

    pub fn link(&mut self, user: User, child_i: I, parent_i: I, name: &str) -> Result<()> {
        fs::link(
            &mut self.engine,
            &self.store,
            user,
            parent_i,
            name,
            child_i,
            self.priv_key(user),
            &self.groupmap,
            &self.usermap,
        )
    }

    pub fn usermap(&self) -> &UserMap {
        &self.usermap
    }

    pub fn groupmap(&self) -> &GroupMap {
        &self.groupmap
    }
}

fn find_entry(entries: &[(DirEntry, usize)], name: &str) -> Option<I> {
    entries.iter().find(|(e, _)| e.name == name).map(|(e, _)| e.child)
}

// Re-exported so embedders constructing usermap/groupmap blobs for
// `init`/tests don't need to reach into private codec helpers.
pub fn encode_usermap(usermap: &UserMap) -> Result<Vec<u8>> {
    encode_users(usermap)
}

pub fn encode_groupmap(groupmap: &GroupMap) -> Vec<u8> {
    encode_groups(groupmap)
}
