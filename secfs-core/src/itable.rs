//! Per-principal inumber→entry map with wrapped symmetric content keys
//! (spec.md §3, §4.4).

use std::collections::BTreeMap;

use secfs_crypto::{gen_sym_key, pk_decrypt, pk_encrypt, Hash, PrivateKey, SymKey};

use crate::block::{BlockServer, BlockStoreClient};
use crate::error::{Result, SecfsError};
use crate::types::{GroupMap, Principal, User, UserMap, I};
use crate::wire::{check_format_tag, Decoder, Encoder, ITABLE_FORMAT_V1};

/// An itable's mapping target: an ihash for a user itable, or a child `I`
/// for a group itable (group indirection, I2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Ihash(Hash),
    Child(I),
}

const ENTRY_TAG_IHASH: u8 = 0;
const ENTRY_TAG_CHILD: u8 = 1;

pub struct Itable {
    owner: Principal,
    version: u64,
    ihandle: Option<Hash>,
    mapping: BTreeMap<u64, Entry>,
    keys: BTreeMap<Principal, Vec<u8>>,
    dirty: bool,
}

/// Users authorized to hold this owner's content key: the user itself, or
/// every member of the group (spec.md §4.4 `create`).
fn authorized_users(owner: Principal, groupmap: &GroupMap) -> Vec<User> {
    match owner {
        Principal::User(uid) => vec![User(uid)],
        Principal::Group(gid) => groupmap.get(&gid).cloned().unwrap_or_default(),
    }
}

fn wrap_key_for(key: &SymKey, usermap: &UserMap, u: User) -> Option<(Principal, Vec<u8>)> {
    let pubkey = usermap.get(&u)?;
    let wrapped = pk_encrypt(pubkey, key.as_bytes()).ok()?;
    Some((u.principal(), wrapped))
}

impl Itable {
    pub fn owner(&self) -> Principal {
        self.owner
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn ihandle(&self) -> Option<Hash> {
        self.ihandle
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_version(&mut self, v: u64) {
        self.version = v;
    }

    /// `create(owner) → Itable` (spec.md §4.4). Generates a fresh symmetric
    /// key and wraps it per authorized user; an empty `mapping`.
    pub fn create(owner: Principal, usermap: &UserMap, groupmap: &GroupMap) -> Self {
        let key = gen_sym_key();
        let keys = authorized_users(owner, groupmap)
            .into_iter()
            .filter_map(|u| wrap_key_for(&key, usermap, u))
            .collect();
        Itable {
            owner,
            version: 0,
            ihandle: None,
            mapping: BTreeMap::new(),
            keys,
            dirty: true,
        }
    }

    /// `load(ihandle, version, owner)` (spec.md §4.4): fetch and decode. If
    /// `keys` decodes empty and `usermap` is now populated, regenerate keys
    /// (the legacy/init case); otherwise leave `keys` untouched — this
    /// system defers re-keying on membership change to the next owner
    /// `create` (DESIGN.md).
    pub fn load<S: BlockServer + ?Sized>(
        store: &BlockStoreClient<S>,
        ihandle: Hash,
        version: u64,
        owner: Principal,
        usermap: &UserMap,
        groupmap: &GroupMap,
    ) -> Result<Self> {
        let raw = store.get(&ihandle, None)?;
        let mut table = Self::decode(&raw, owner)?;
        table.version = version;
        table.ihandle = Some(ihandle);
        table.dirty = false;

        if table.keys.is_empty() && !usermap.is_empty() {
            let key = gen_sym_key();
            table.keys = authorized_users(owner, groupmap)
                .into_iter()
                .filter_map(|u| wrap_key_for(&key, usermap, u))
                .collect();
            table.dirty = true;
        }
        Ok(table)
    }

    /// `lookup(n) → entry`. Fails `NoSuchInumber`.
    pub fn lookup(&self, n: u64) -> Result<&Entry> {
        self.mapping.get(&n).ok_or(SecfsError::NoSuchInumber)
    }

    /// Smallest nonnegative integer not in `mapping`.
    pub fn allocate_inumber(&self) -> u64 {
        let mut n = 0u64;
        while self.mapping.contains_key(&n) {
            n += 1;
        }
        n
    }

    pub fn set(&mut self, n: u64, entry: Entry) {
        self.mapping.insert(n, entry);
        self.dirty = true;
    }

    /// `get_content_key(user) → K?`. `None` if `user` holds no wrapped key
    /// in this itable; the caller supplies that user's private key to
    /// unwrap it.
    pub fn get_content_key(&self, user: User, priv_key: &PrivateKey) -> Result<Option<SymKey>> {
        let Some(wrapped) = self.keys.get(&user.principal()) else {
            return Ok(None);
        };
        let raw = pk_decrypt(priv_key, wrapped)?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| SecfsError::CorruptMapping)?;
        Ok(Some(SymKey::from_bytes(bytes)))
    }

    /// `save() → ihash`. Canonical encoding of `(sorted mapping, sorted
    /// keys)`, stored unencrypted; updates `ihandle` and clears `dirty`.
    pub fn save<S: BlockServer + ?Sized>(&mut self, store: &BlockStoreClient<S>) -> Result<Hash> {
        let encoded = self.encode();
        let hash = store.put(&encoded, None)?;
        self.ihandle = Some(hash);
        self.dirty = false;
        Ok(hash)
    }

    fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u8(ITABLE_FORMAT_V1).u32(self.mapping.len() as u32);
        for (n, entry) in &self.mapping {
            enc.u64(*n);
            match entry {
                Entry::Ihash(h) => {
                    enc.u8(ENTRY_TAG_IHASH);
                    enc.hash(h);
                }
                Entry::Child(i) => {
                    enc.u8(ENTRY_TAG_CHILD);
                    enc.principal(&i.p());
                    enc.u64(i.n().expect("itable entries reference only allocated I"));
                }
            }
        }
        enc.u32(self.keys.len() as u32);
        for (p, wrapped) in &self.keys {
            enc.principal(p);
            enc.bytes(wrapped);
        }
        enc.into_vec()
    }

    fn decode(buf: &[u8], owner: Principal) -> Result<Self> {
        let expect_child = owner.is_group();
        let mut dec = Decoder::new(buf);
        check_format_tag(&mut dec, ITABLE_FORMAT_V1, SecfsError::CorruptMapping)?;

        let n_entries = dec.u32().ok_or(SecfsError::CorruptMapping)? as usize;
        let mut mapping = BTreeMap::new();
        for _ in 0..n_entries {
            let n = dec.u64().ok_or(SecfsError::CorruptMapping)?;
            let tag = dec.u8().ok_or(SecfsError::CorruptMapping)?;
            let entry = match (tag, expect_child) {
                (ENTRY_TAG_IHASH, false) => Entry::Ihash(dec.hash().ok_or(SecfsError::CorruptMapping)?),
                (ENTRY_TAG_CHILD, true) => {
                    let p = dec.principal().ok_or(SecfsError::CorruptMapping)?;
                    let inumber = dec.u64().ok_or(SecfsError::CorruptMapping)?;
                    Entry::Child(I::allocated(p, inumber))
                }
                _ => return Err(SecfsError::CorruptMapping),
            };
            mapping.insert(n, entry);
        }

        let n_keys = dec.u32().ok_or(SecfsError::CorruptMapping)? as usize;
        let mut keys = BTreeMap::new();
        for _ in 0..n_keys {
            let p = dec.principal().ok_or(SecfsError::CorruptMapping)?;
            let wrapped = dec.bytes().ok_or(SecfsError::CorruptMapping)?;
            keys.insert(p, wrapped);
        }

        if !dec.at_end() {
            return Err(SecfsError::CorruptMapping);
        }

        Ok(Itable {
            owner,
            version: 0,
            ihandle: None,
            mapping,
            keys,
            dirty: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::InMemoryBlockServer;
    use secfs_crypto::gen_keypair;
    use std::sync::Arc;

    fn store() -> BlockStoreClient<InMemoryBlockServer> {
        BlockStoreClient::new(Arc::new(InMemoryBlockServer::new()))
    }

    #[test]
    fn allocate_inumber_fills_gaps() {
        let mut t = Itable::create(Principal::user(0), &UserMap::new(), &GroupMap::new());
        assert_eq!(t.allocate_inumber(), 0);
        t.set(0, Entry::Ihash(secfs_crypto::sha256(b"x")));
        assert_eq!(t.allocate_inumber(), 1);
        t.set(2, Entry::Ihash(secfs_crypto::sha256(b"y")));
        assert_eq!(t.allocate_inumber(), 1);
    }

    #[test]
    fn lookup_missing_is_no_such_inumber() {
        let t = Itable::create(Principal::user(0), &UserMap::new(), &GroupMap::new());
        assert!(matches!(t.lookup(0), Err(SecfsError::NoSuchInumber)));
    }

    #[test]
    fn save_is_deterministic_given_identical_state() {
        let s = store();
        let mut t1 = Itable::create(Principal::user(0), &UserMap::new(), &GroupMap::new());
        t1.set(0, Entry::Ihash(secfs_crypto::sha256(b"content")));
        let mut t2 = Itable::create(Principal::user(0), &UserMap::new(), &GroupMap::new());
        t2.set(0, Entry::Ihash(secfs_crypto::sha256(b"content")));

        let h1 = t1.save(&s).unwrap();
        let h2 = t2.save(&s).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn content_key_wrapped_and_recoverable_for_owner() {
        let (pk, sk) = gen_keypair();
        let u = User::new(0);
        let mut usermap = UserMap::new();
        usermap.insert(u, pk);

        let t = Itable::create(Principal::user(0), &usermap, &GroupMap::new());
        let key = t.get_content_key(u, &sk).unwrap();
        assert!(key.is_some());
    }

    #[test]
    fn content_key_absent_for_unauthorized_user() {
        let (pk, sk) = gen_keypair();
        let owner = User::new(0);
        let outsider = User::new(1);
        let mut usermap = UserMap::new();
        usermap.insert(owner, pk);

        let t = Itable::create(Principal::user(0), &usermap, &GroupMap::new());
        let (_, outsider_sk) = gen_keypair();
        let key = t.get_content_key(outsider, &outsider_sk).unwrap();
        assert!(key.is_none());
        let _ = sk;
    }

    #[test]
    fn group_itable_rejects_ihash_entries() {
        let s = store();
        let mut enc = Encoder::new();
        enc.u8(ITABLE_FORMAT_V1).u32(1u32);
        enc.u64(0);
        enc.u8(ENTRY_TAG_IHASH);
        enc.hash(&secfs_crypto::sha256(b"x"));
        enc.u32(0u32);
        let h = s.put(&enc.into_vec(), None).unwrap();

        let err = Itable::load(&s, h, 1, Principal::group(0), &UserMap::new(), &GroupMap::new());
        assert!(matches!(err, Err(SecfsError::CorruptMapping)));
    }
}
