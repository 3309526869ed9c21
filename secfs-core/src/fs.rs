//! `create`/`mkdir`, `read`, `write`, `readdir`, `link`, `init` (spec.md
//! §4.5), grounded operation-for-operation in `secfs/fs.py` and
//! `secfs/store/tree.py::Directory::add`.
//!
//! Every operation here runs strictly between a caller's `VslEngine::pre`
//! and `VslEngine::post` (`client.rs` enforces that sequencing); nothing
//! in this module touches the server directly.

use secfs_crypto::PrivateKey;

use crate::access::{can_read, can_write};
use crate::block::{BlockServer, BlockStoreClient};
use crate::directory::{DirEntry, Directory};
use crate::error::{Result, SecfsError};
use crate::inode::{Inode, Kind};
use crate::types::{GroupMap, Principal, User, UserMap, I};
use crate::vsl::{ModValue, VslEngine};

fn content_key(
    engine: &VslEngine,
    owner: Principal,
    acting_user: User,
    encrypted: bool,
    priv_key: Option<&PrivateKey>,
) -> Result<Option<secfs_crypto::SymKey>> {
    if !encrypted {
        return Ok(None);
    }
    let key = priv_key.ok_or(SecfsError::KeyAbsent)?;
    let table = engine.itables().get(&owner).ok_or(SecfsError::PermissionDenied)?;
    table.get_content_key(acting_user, key)?.ok_or(SecfsError::PermissionDenied).map(Some)
}

fn load_inode<S: BlockServer + ?Sized>(store: &BlockStoreClient<S>, ihash: secfs_crypto::Hash) -> Result<Inode> {
    Inode::decode(&store.get(&ihash, None)?)
}

fn load_full_content<S: BlockServer + ?Sized>(
    store: &BlockStoreClient<S>,
    inode: &Inode,
    key: Option<&secfs_crypto::SymKey>,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(inode.size as usize);
    for block in &inode.blocks {
        out.extend_from_slice(&store.get(block, key)?);
    }
    Ok(out)
}

/// `init(owner, users_blob, groups_blob) → root_I` (spec.md §4.5).
/// Bootstrap only — does not push a VS.
#[allow(clippy::too_many_arguments)]
pub fn init<S: BlockServer + ?Sized>(
    engine: &mut VslEngine,
    store: &BlockStoreClient<S>,
    owner: User,
    usermap: &UserMap,
    groupmap: &GroupMap,
    users_blob: &[u8],
    groups_blob: &[u8],
    now: u64,
) -> Result<I> {
    engine.ensure_itable(owner.principal(), usermap, groupmap);

    let mut root_inode = Inode::new_empty(Kind::Dir, false, false, now);
    let stub_hash = store.put(&root_inode.encode(), None)?;
    let root_i = engine.modmap(owner, I::unallocated(owner.principal()), ModValue::Ihash(stub_hash), groupmap, usermap)?;

    let payload = Directory::with_dot_entries(root_i, root_i);
    let payload_bytes = payload.encode();
    let dir_hash = store.put(&payload_bytes, None)?;
    root_inode.blocks = vec![dir_hash];
    root_inode.size = payload_bytes.len() as u64;
    let root_hash = store.put(&root_inode.encode(), None)?;
    let root_i = engine.modmap(owner, root_i, ModValue::Ihash(root_hash), groupmap, usermap)?;

    let users_i = create(
        engine, store, root_i, ".users", owner, owner.principal(), false, Kind::File, None, usermap, groupmap, now,
    )?;
    write(engine, store, owner, users_i, 0, users_blob, None, groupmap, usermap, now)?;

    let groups_i = create(
        engine, store, root_i, ".groups", owner, owner.principal(), false, Kind::File, None, usermap, groupmap, now,
    )?;
    write(engine, store, owner, groups_i, 0, groups_blob, None, groupmap, usermap, now)?;

    Ok(root_i)
}

/// `create`/`mkdir(parent_I, name, acting_user, owner_principal,
/// encrypted) → I` (spec.md §4.5).
#[allow(clippy::too_many_arguments)]
pub fn create<S: BlockServer + ?Sized>(
    engine: &mut VslEngine,
    store: &BlockStoreClient<S>,
    parent_i: I,
    name: &str,
    acting_user: User,
    owner_principal: Principal,
    encrypted: bool,
    kind: Kind,
    priv_key: Option<&PrivateKey>,
    usermap: &UserMap,
    groupmap: &GroupMap,
    now: u64,
) -> Result<I> {
    if !can_write(acting_user, &parent_i, groupmap) {
        return Err(SecfsError::PermissionDenied);
    }
    if let Principal::Group(g) = owner_principal {
        let is_member = groupmap.get(&g).map(|m| m.contains(&acting_user)).unwrap_or(false);
        if !is_member {
            return Err(SecfsError::PermissionDenied);
        }
    }

    engine.ensure_itable(owner_principal, usermap, groupmap);
    let key = content_key(engine, owner_principal, acting_user, encrypted, priv_key)?;

    let mut inode = Inode::new_empty(kind, encrypted, false, now);
    let stub_hash = store.put(&inode.encode(), None)?;
    let child_i = engine.modmap(
        acting_user,
        I::unallocated(owner_principal),
        ModValue::Ihash(stub_hash),
        groupmap,
        usermap,
    )?;

    if kind == Kind::Dir {
        let payload = Directory::with_dot_entries(child_i, parent_i);
        let payload_bytes = payload.encode();
        let dir_hash = store.put(&payload_bytes, key.as_ref())?;
        inode.blocks = vec![dir_hash];
        inode.size = payload_bytes.len() as u64;
        let new_hash = store.put(&inode.encode(), None)?;
        engine.modmap(acting_user, child_i, ModValue::Ihash(new_hash), groupmap, usermap)?;
    }

    link(engine, store, acting_user, parent_i, name, child_i, priv_key, groupmap, usermap)?;
    Ok(child_i)
}

/// `read(user, i, off, size)` (spec.md §4.5).
pub fn read<S: BlockServer + ?Sized>(
    engine: &VslEngine,
    store: &BlockStoreClient<S>,
    user: User,
    i: I,
    off: usize,
    size: usize,
    priv_key: Option<&PrivateKey>,
    groupmap: &GroupMap,
) -> Result<Vec<u8>> {
    let data = read_all(engine, store, user, i, priv_key, groupmap)?;
    let start = off.min(data.len());
    let end = off.saturating_add(size).min(data.len());
    Ok(data[start..end].to_vec())
}

/// Reads the full content of `i`, with no offset/size windowing — used
/// internally and by `Client` to load `/.users`/`/.groups` in full.
pub fn read_all<S: BlockServer + ?Sized>(
    engine: &VslEngine,
    store: &BlockStoreClient<S>,
    user: User,
    i: I,
    priv_key: Option<&PrivateKey>,
    groupmap: &GroupMap,
) -> Result<Vec<u8>> {
    if !can_read(user, &i, groupmap) {
        return Err(SecfsError::PermissionDenied);
    }
    let ihash = engine.resolve_ihash(i)?.ok_or(SecfsError::NoSuchInumber)?;
    let inode = load_inode::<S>(store, ihash)?;
    let key = content_key(engine, i.p(), user, inode.encrypted, priv_key)?;
    load_full_content(store, &inode, key.as_ref())
}

/// `write(user, i, off, buf)` (spec.md §4.5): splice at `off`, re-chunk
/// into a single new content block.
#[allow(clippy::too_many_arguments)]
pub fn write<S: BlockServer + ?Sized>(
    engine: &mut VslEngine,
    store: &BlockStoreClient<S>,
    user: User,
    i: I,
    off: usize,
    buf: &[u8],
    priv_key: Option<&PrivateKey>,
    groupmap: &GroupMap,
    usermap: &UserMap,
    now: u64,
) -> Result<usize> {
    if !can_write(user, &i, groupmap) {
        return Err(SecfsError::PermissionDenied);
    }
    let ihash = engine.resolve_ihash(i)?.ok_or(SecfsError::NoSuchInumber)?;
    let mut inode = load_inode::<S>(store, ihash)?;
    let key = content_key(engine, i.p(), user, inode.encrypted, priv_key)?;

    let mut data = load_full_content(store, &inode, key.as_ref())?;
    let end = off + buf.len();
    if data.len() < end {
        data.resize(end, 0);
    }
    data[off..end].copy_from_slice(buf);

    let new_block = store.put(&data, key.as_ref())?;
    inode.blocks = vec![new_block];
    inode.size = data.len() as u64;
    inode.mtime = now;
    let new_ihash = store.put(&inode.encode(), None)?;
    engine.modmap(user, i, ModValue::Ihash(new_ihash), groupmap, usermap)?;
    Ok(buf.len())
}

/// `readdir(i, off, user)` (spec.md §4.5): entries at index ≥ `off`, each
/// paired with the successor index for paged listing.
///
/// No access gate here: inodes are never encrypted, so traversal never
/// needs a key the caller doesn't have (spec.md §3), and the original
/// `secfs/fs.py::readdir` performs no check either. An encrypted
/// directory's contents are still protected below, by `content_key`
/// refusing to produce a key the caller isn't authorized for.
pub fn readdir<S: BlockServer + ?Sized>(
    engine: &VslEngine,
    store: &BlockStoreClient<S>,
    i: I,
    off: usize,
    user: User,
    priv_key: Option<&PrivateKey>,
    groupmap: &GroupMap,
) -> Result<Vec<(DirEntry, usize)>> {
    let ihash = engine.resolve_ihash(i)?.ok_or(SecfsError::NoSuchInumber)?;
    let inode = load_inode::<S>(store, ihash)?;
    if !inode.is_dir() {
        return Err(SecfsError::NotADirectory);
    }
    let key = content_key(engine, i.p(), user, inode.encrypted, priv_key)?;
    let payload = load_full_content(store, &inode, key.as_ref())?;
    let dir = Directory::decode(&payload)?;

    Ok(dir
        .entries
        .into_iter()
        .enumerate()
        .skip(off)
        .map(|(idx, e)| (e, idx + 1))
        .collect())
}

/// `link(user, i, parent_i, name)` (spec.md §4.5). Fails `NameExists` if
/// `name` is already present in the parent directory.
pub fn link<S: BlockServer + ?Sized>(
    engine: &mut VslEngine,
    store: &BlockStoreClient<S>,
    user: User,
    parent_i: I,
    name: &str,
    child_i: I,
    priv_key: Option<&PrivateKey>,
    groupmap: &GroupMap,
    usermap: &UserMap,
) -> Result<()> {
    if !can_write(user, &parent_i, groupmap) {
        return Err(SecfsError::PermissionDenied);
    }
    let parent_ihash = engine.resolve_ihash(parent_i)?.ok_or(SecfsError::NoSuchInumber)?;
    let mut parent_inode = load_inode::<S>(store, parent_ihash)?;
    if !parent_inode.is_dir() {
        return Err(SecfsError::NotADirectory);
    }
    let key = content_key(engine, parent_i.p(), user, parent_inode.encrypted, priv_key)?;

    let payload = load_full_content(store, &parent_inode, key.as_ref())?;
    let mut dir = Directory::decode(&payload)?;
    dir.add(name, child_i)?;

    let new_payload = dir.encode();
    let new_dir_hash = store.put(&new_payload, key.as_ref())?;
    parent_inode.blocks = vec![new_dir_hash];
    parent_inode.size = new_payload.len() as u64;
    let new_inode_hash = store.put(&parent_inode.encode(), None)?;
    engine.modmap(user, parent_i, ModValue::Ihash(new_inode_hash), groupmap, usermap)?;
    Ok(())
}
