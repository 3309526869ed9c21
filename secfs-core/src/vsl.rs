//! The VSL engine: `pre`/`post`, `modmap`, `resolve` (spec.md §4.6, the
//! heart of fork consistency). Grounded in `secfs/tables.py`'s `pre`,
//! `post`, `create_new_vs`, `resolve`, `modmap`, extended with the
//! signed, version-vector, total-order VSL schema spec.md §9 specifies
//! (the original has no signatures at all).

use std::collections::{BTreeMap, HashMap};

use secfs_crypto::{sign, verify, Hash, PrivateKey, PublicKey, SignatureBytes};
use tracing::{debug, warn};

use crate::block::{BlockServer, BlockStoreClient};
use crate::error::{Result, SecfsError};
use crate::itable::{Entry, Itable};
use crate::types::{GroupMap, Principal, User, UserMap, I};
use crate::wire::{Encoder, VersionStructDict, VS_FORMAT_V1};

/// A user's signed snapshot of every principal's latest itable (spec.md §3).
#[derive(Debug, Clone)]
pub struct VersionStruct {
    pub principal: User,
    pub ihandles: BTreeMap<Principal, Hash>,
    pub versions: BTreeMap<Principal, u64>,
    pub signature: SignatureBytes,
}

impl VersionStruct {
    /// Canonical byte encoding covered by the signature: principal
    /// identity, then sorted `(principal, ihandle)`, then sorted
    /// `(principal, version)` — iteration order comes from `BTreeMap`'s
    /// own `Principal` ordering, which only needs to be deterministic.
    pub fn bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u8(VS_FORMAT_V1).principal(&self.principal.principal());
        enc.u32(self.ihandles.len() as u32);
        for (p, h) in &self.ihandles {
            enc.principal(p);
            enc.hash(h);
        }
        enc.u32(self.versions.len() as u32);
        for (p, v) in &self.versions {
            enc.principal(p);
            enc.u64(*v);
        }
        enc.into_vec()
    }

    pub fn to_dict(&self) -> VersionStructDict {
        VersionStructDict {
            class: VersionStructDict::class_tag(),
            principal: self.principal.to_string(),
            ihandles: self
                .ihandles
                .iter()
                .map(|(p, h)| (p.to_string(), h.to_hex()))
                .collect(),
            versions: self.versions.iter().map(|(p, v)| (p.to_string(), *v)).collect(),
            signature: hex::encode(&self.signature.0),
        }
    }

    pub fn from_dict(d: &VersionStructDict) -> Result<Self> {
        let principal = match Principal::parse(&d.principal) {
            Some(Principal::User(u)) => User(u),
            _ => return Err(SecfsError::CorruptMapping),
        };
        let mut ihandles = BTreeMap::new();
        for (p_str, h_str) in &d.ihandles {
            let p = Principal::parse(p_str).ok_or(SecfsError::CorruptMapping)?;
            let h = Hash::from_hex(h_str).ok_or(SecfsError::CorruptMapping)?;
            ihandles.insert(p, h);
        }
        let mut versions = BTreeMap::new();
        for (p_str, v) in &d.versions {
            let p = Principal::parse(p_str).ok_or(SecfsError::CorruptMapping)?;
            versions.insert(p, *v);
        }
        let sig_bytes = hex::decode(&d.signature).map_err(|_| SecfsError::CorruptMapping)?;
        Ok(VersionStruct {
            principal,
            ihandles,
            versions,
            signature: SignatureBytes(sig_bytes),
        })
    }
}

/// What to install at an inumber during `modmap`: a concrete content
/// ihash (user itables), or a caller-supplied child `I` (group
/// indirection installs).
#[derive(Debug, Clone)]
pub enum ModValue {
    Ihash(Hash),
    ChildI(I),
}

/// The result of `resolve` one step: either a content ihash (user
/// itables) or a child `I` to keep following (group itables).
#[derive(Debug, Clone, Copy)]
pub enum Resolved {
    Ihash(Hash),
    ChildI(I),
}

/// `a <= b` componentwise over the union of keys, treating a missing key
/// as 0 (spec.md §4.6 `post` step 4, §5 ordering guarantee).
fn dominates(a: &BTreeMap<Principal, u64>, b: &BTreeMap<Principal, u64>) -> bool {
    let keys = a.keys().chain(b.keys());
    keys.into_iter().all(|k| a.get(k).copied().unwrap_or(0) <= b.get(k).copied().unwrap_or(0))
}

fn comparable(a: &BTreeMap<Principal, u64>, b: &BTreeMap<Principal, u64>) -> bool {
    dominates(a, b) || dominates(b, a)
}

/// Owns the per-principal itable cache and the last-observed VSL, and
/// implements the fork-consistency protocol against a `BlockServer`.
pub struct VslEngine {
    itables: HashMap<Principal, Itable>,
    last_vsl: HashMap<User, VersionStruct>,
    active_user: Option<User>,
}

impl Default for VslEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VslEngine {
    pub fn new() -> Self {
        VslEngine {
            itables: HashMap::new(),
            last_vsl: HashMap::new(),
            active_user: None,
        }
    }

    pub fn itables(&self) -> &HashMap<Principal, Itable> {
        &self.itables
    }

    /// Loads or creates `p`'s itable in the local cache without touching
    /// the VSL — used by `fs.rs` before it can ask for a content key.
    pub fn ensure_itable(&mut self, p: Principal, usermap: &UserMap, groupmap: &GroupMap) -> &Itable {
        self.itables.entry(p).or_insert_with(|| Itable::create(p, usermap, groupmap))
    }

    pub fn active_user(&self) -> Option<User> {
        self.active_user
    }

    /// `pre(user)` (spec.md §4.6): fetch+verify the VSL, detect forks
    /// against what this client previously observed, and rebuild the
    /// itable cache. `/.users`/`/.groups` reparsing is driven by the
    /// caller after this returns (it goes through ordinary `read`, which
    /// lives above this module in `fs.rs`).
    pub fn pre<S: BlockServer + ?Sized>(
        &mut self,
        user: User,
        store: &BlockStoreClient<S>,
        usermap: &UserMap,
        bootstrap_keyring: &UserMap,
        groupmap: &GroupMap,
    ) -> Result<()> {
        let raw = store.server().get_vsl()?;

        let mut fetched: HashMap<User, VersionStruct> = HashMap::new();
        for dict in raw.values() {
            let vs = VersionStruct::from_dict(dict)?;
            let pubkey: &PublicKey = usermap
                .get(&vs.principal)
                .or_else(|| bootstrap_keyring.get(&vs.principal))
                .ok_or(SecfsError::BadSignature)?;
            verify(pubkey, &vs.signature, &vs.bytes()).map_err(|_| {
                warn!(principal = %vs.principal, "VS signature verification failed");
                SecfsError::BadSignature
            })?;
            fetched.insert(vs.principal, vs);
        }

        // Previously-observed VSes must not disappear or regress.
        for (u, old) in &self.last_vsl {
            match fetched.get(u) {
                Some(new) if dominates(&old.versions, &new.versions) => {}
                Some(_) => {
                    warn!(user = %u, "previously observed VS regressed");
                    return Err(SecfsError::ForkDetected);
                }
                None => {
                    let covered = fetched.values().any(|v| dominates(&old.versions, &v.versions));
                    if !covered {
                        warn!(user = %u, "previously observed VS vanished and is not covered");
                        return Err(SecfsError::ForkDetected);
                    }
                }
            }
        }

        // Total order across everything currently presented.
        let vectors: Vec<&BTreeMap<Principal, u64>> = fetched.values().map(|v| &v.versions).collect();
        for i in 0..vectors.len() {
            for j in (i + 1)..vectors.len() {
                if !comparable(vectors[i], vectors[j]) {
                    warn!("VSL is not totally ordered");
                    return Err(SecfsError::ForkDetected);
                }
            }
        }

        let mut itables = HashMap::new();
        for vs in fetched.values() {
            for (p, ih) in &vs.ihandles {
                let v = vs.versions.get(p).copied().unwrap_or(0);
                match itables.get(p) {
                    None => {
                        let table = Itable::load(store, *ih, v, *p, usermap, groupmap)?;
                        itables.insert(*p, table);
                    }
                    Some(existing) if existing.version() < v => {
                        let table = Itable::load(store, *ih, v, *p, usermap, groupmap)?;
                        itables.insert(*p, table);
                    }
                    Some(existing) if existing.version() == v => {
                        if existing.ihandle() != Some(*ih) {
                            warn!(principal = %p, "equal-version itables disagree on ihandle");
                            return Err(SecfsError::ForkDetected);
                        }
                    }
                    _ => {}
                }
            }
        }

        self.itables = itables;
        self.last_vsl = fetched;
        self.active_user = Some(user);
        debug!(user = %user, "pre completed");
        Ok(())
    }

    /// `post(push)` (spec.md §4.6): persist dirty itables, update the
    /// acting user's VS, re-check total order, sign, and (if `push`)
    /// commit. `push = false` performs every local step except the
    /// server commit — no server-visible effect, per spec.md §5.
    pub fn post<S: BlockServer + ?Sized>(
        &mut self,
        user: User,
        push: bool,
        priv_key: &PrivateKey,
        store: &BlockStoreClient<S>,
        groupmap: &GroupMap,
    ) -> Result<()> {
        if !self.itables.contains_key(&user.principal()) {
            debug!(user = %user, "post: read-only operation, nothing to commit");
            return Ok(());
        }

        let mut vs = self.last_vsl.get(&user).cloned().unwrap_or_else(|| {
            let mut ihandles = BTreeMap::new();
            let mut versions = BTreeMap::new();
            for (p, table) in &self.itables {
                versions.insert(*p, table.version());
                if let Some(ih) = table.ihandle() {
                    ihandles.insert(*p, ih);
                }
            }
            versions.insert(user.principal(), 1);
            VersionStruct {
                principal: user,
                ihandles,
                versions,
                signature: SignatureBytes(Vec::new()),
            }
        });

        let principals: Vec<Principal> = self.itables.keys().copied().collect();
        for p in principals {
            let dirty = self.itables.get(&p).expect("collected from self.itables").is_dirty();
            if dirty {
                let legal = p == user.principal()
                    || match p {
                        Principal::Group(g) => groupmap.get(&g).map(|m| m.contains(&user)).unwrap_or(false),
                        Principal::User(_) => false,
                    };
                if !legal {
                    return Err(SecfsError::PermissionDenied);
                }
                let table = self.itables.get_mut(&p).expect("present");
                let new_ih = table.save(store)?;
                if vs.ihandles.get(&p).copied() != Some(new_ih) {
                    *vs.versions.entry(p).or_insert(0) += 1;
                }
                vs.ihandles.insert(p, new_ih);
            } else {
                let table = self.itables.get(&p).expect("present");
                let table_version = table.version();
                if vs.versions.get(&p).copied().unwrap_or(0) < table_version {
                    vs.versions.insert(p, table_version);
                    if let Some(ih) = table.ihandle() {
                        if vs.ihandles.contains_key(&p) {
                            vs.ihandles.insert(p, ih);
                        }
                    }
                }
            }
        }

        let mut vectors: Vec<&BTreeMap<Principal, u64>> =
            self.last_vsl.iter().filter(|(u, _)| **u != user).map(|(_, v)| &v.versions).collect();
        vectors.push(&vs.versions);
        for i in 0..vectors.len() {
            for j in (i + 1)..vectors.len() {
                if !comparable(vectors[i], vectors[j]) {
                    warn!("post: total order violated, aborting commit");
                    return Err(SecfsError::ForkDetected);
                }
            }
        }

        vs.signature = sign(priv_key, &vs.bytes());

        if push {
            store.server().commit(user, vs.to_dict())?;
            self.last_vsl.insert(user, vs);
        }
        debug!(user = %user, push, "post completed");
        Ok(())
    }

    fn resolve_one_level(&self, i: &I) -> Result<Option<I>> {
        let Some(table) = self.itables.get(&i.p()) else {
            return Ok(None);
        };
        let Some(n) = i.n() else {
            return Ok(None);
        };
        match table.lookup(n) {
            Ok(Entry::Child(child)) => Ok(Some(*child)),
            Ok(Entry::Ihash(_)) => Err(SecfsError::CorruptMapping),
            Err(SecfsError::NoSuchInumber) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `modmap(mod_as, i, ihash_or_child_i)` (spec.md §4.6).
    pub fn modmap(&mut self, mod_as: User, i: I, val: ModValue, groupmap: &GroupMap, usermap: &UserMap) -> Result<I> {
        if i.p() == mod_as.principal() {
            let table = self
                .itables
                .entry(i.p())
                .or_insert_with(|| Itable::create(i.p(), usermap, groupmap));
            let n = i.n().unwrap_or_else(|| table.allocate_inumber());
            let entry = match val {
                ModValue::Ihash(h) => Entry::Ihash(h),
                ModValue::ChildI(_) => return Err(SecfsError::CorruptMapping),
            };
            table.set(n, entry);
            return Ok(I::allocated(i.p(), n));
        }

        if !i.p().is_group() {
            return Err(SecfsError::PermissionDenied);
        }

        let real_i = self.resolve_one_level(&i)?;

        if let Some(child) = real_i {
            if child.p() == mod_as.principal() {
                // We modified this group I most recently — update our own
                // entry in place, no need to touch the group's pointer.
                let new_child = self.modmap(mod_as, child, val, groupmap, usermap)?;
                let n = i.n().expect("group I must be allocated to reach an existing entry");
                let gtable = self.itables.get_mut(&i.p()).expect("group table present after resolve_one_level");
                gtable.set(n, Entry::Child(new_child));
                return Ok(I::allocated(i.p(), n));
            }
        }

        // Either nobody has written through this group I yet, or somebody
        // else did last. Either way, claim it: allocate (or reuse a
        // caller-supplied) entry under mod_as and repoint the group I at it.
        match val {
            ModValue::ChildI(child_i) => {
                let gtable = self
                    .itables
                    .entry(i.p())
                    .or_insert_with(|| Itable::create(i.p(), usermap, groupmap));
                let n = i.n().unwrap_or_else(|| gtable.allocate_inumber());
                gtable.set(n, Entry::Child(child_i));
                Ok(I::allocated(i.p(), n))
            }
            ModValue::Ihash(h) => {
                let user_i = I::unallocated(mod_as.principal());
                let new_user_i = self.modmap(mod_as, user_i, ModValue::Ihash(h), groupmap, usermap)?;
                let gtable = self
                    .itables
                    .entry(i.p())
                    .or_insert_with(|| Itable::create(i.p(), usermap, groupmap));
                let n = i.n().unwrap_or_else(|| gtable.allocate_inumber());
                gtable.set(n, Entry::Child(new_user_i));
                Ok(I::allocated(i.p(), n))
            }
        }
    }

    /// `resolve(i, follow_groups)` (spec.md §4.6). Group indirection is
    /// capped at depth 2 — a group entry that points at another group is
    /// `CorruptMapping` (spec.md §9).
    pub fn resolve(&self, i: I, follow_groups: bool) -> Result<Option<Resolved>> {
        if !i.is_allocated() {
            return Ok(None);
        }
        let Some(table) = self.itables.get(&i.p()) else {
            return Ok(None);
        };
        let n = i.n().expect("checked is_allocated above");
        let entry = table.lookup(n)?;
        match entry {
            Entry::Ihash(h) => Ok(Some(Resolved::Ihash(*h))),
            Entry::Child(child) => {
                if !follow_groups {
                    return Ok(Some(Resolved::ChildI(*child)));
                }
                if child.p().is_group() {
                    return Err(SecfsError::CorruptMapping);
                }
                self.resolve(*child, true)
            }
        }
    }

    pub fn resolve_ihash(&self, i: I) -> Result<Option<Hash>> {
        match self.resolve(i, true)? {
            Some(Resolved::Ihash(h)) => Ok(Some(h)),
            Some(Resolved::ChildI(_)) => Err(SecfsError::CorruptMapping),
            None => Ok(None),
        }
    }
}
