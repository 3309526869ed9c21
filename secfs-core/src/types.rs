//! Core identity types: `Principal`, the `User`/`Group` ids it wraps, and
//! `I`, the inode identifier.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use secfs_crypto::PublicKey;

/// `/.users`, parsed: each registered user's public key (spec.md §6).
pub type UserMap = HashMap<User, PublicKey>;

/// `/.groups`, parsed: each group's member list (spec.md §6).
pub type GroupMap = HashMap<GroupId, Vec<User>>;

/// A user identifier. Stable for the lifetime of a share — never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

/// A group identifier. Stable for the lifetime of a share — never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

/// A `User` or `Group` identity. Totally ordered by `(tag, id)` with
/// `User` sorting before `Group` at equal numeric id — this ordering only
/// needs to be *consistent*, since it exists purely so that VSL/itable
/// encodings can sort principals deterministically (spec.md §4.4, §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Principal {
    User(UserId),
    Group(GroupId),
}

impl Principal {
    pub fn user(uid: u64) -> Self {
        Principal::User(UserId(uid))
    }

    pub fn group(gid: u64) -> Self {
        Principal::Group(GroupId(gid))
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Principal::User(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Principal::Group(_))
    }

    /// Parse the wire form `"u<uid>"` / `"g<gid>"` (spec.md §3, §6). Runs on
    /// bytes a malicious server controls (itable/dir blobs, VSL entries), so
    /// an empty or malformed string must yield `None`, never panic.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let tag = chars.next()?;
        let id: u64 = chars.as_str().parse().ok()?;
        match tag {
            'u' => Some(Principal::User(UserId(id))),
            'g' => Some(Principal::Group(GroupId(id))),
            _ => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(UserId(id)) => write!(f, "u{}", id),
            Principal::Group(GroupId(id)) => write!(f, "g{}", id),
        }
    }
}

impl PartialOrd for Principal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Principal {
    fn cmp(&self, other: &Self) -> Ordering {
        fn key(p: &Principal) -> (u8, u64) {
            match p {
                Principal::User(UserId(id)) => (0, *id),
                Principal::Group(GroupId(id)) => (1, *id),
            }
        }
        key(self).cmp(&key(other))
    }
}

/// A user principal specifically — many operations (acting user, signer)
/// require a `User`, not an arbitrary `Principal` (spec.md §4.5, §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct User(pub UserId);

impl User {
    pub fn new(uid: u64) -> Self {
        User(UserId(uid))
    }

    pub fn principal(&self) -> Principal {
        Principal::User(self.0)
    }

    pub fn id(&self) -> u64 {
        self.0 .0
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0 .0)
    }
}

impl From<User> for Principal {
    fn from(u: User) -> Self {
        u.principal()
    }
}

/// An inode identifier: `(principal, inumber)`. `n` is `None` until the
/// first `modmap`/`Itable::allocate_inumber` call allocates it — an
/// unallocated `I` is never hashable or storable (spec.md §3, invariant
/// "An I without n is unallocated").
#[derive(Clone, Copy, Debug)]
pub struct I {
    p: Principal,
    n: Option<u64>,
}

impl I {
    /// A fresh, unallocated `I` rooted at `p`.
    pub fn unallocated(p: Principal) -> Self {
        I { p, n: None }
    }

    /// An already-allocated `I`.
    pub fn allocated(p: Principal, n: u64) -> Self {
        I { p, n: Some(n) }
    }

    pub fn p(&self) -> Principal {
        self.p
    }

    pub fn n(&self) -> Option<u64> {
        self.n
    }

    pub fn is_allocated(&self) -> bool {
        self.n.is_some()
    }

    /// Fill in the inumber of a previously unallocated `I`. Panics if
    /// already allocated — re-allocating an allocated `I` is a logic
    /// error in the caller, not a recoverable condition (mirrors the
    /// original's `I.allocate`, which raises `AssertionError`).
    pub fn allocate(&mut self, n: u64) {
        assert!(self.n.is_none(), "tried to re-allocate allocated I");
        self.n = Some(n);
    }
}

impl PartialEq for I {
    fn eq(&self, other: &Self) -> bool {
        self.p == other.p && self.n == other.n
    }
}
impl Eq for I {}

impl fmt::Display for I {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.n {
            Some(n) => write!(f, "({}, {})", self.p, n),
            None => write!(f, "({}, <unallocated>)", self.p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_parse_roundtrip() {
        assert_eq!(Principal::parse("u7"), Some(Principal::user(7)));
        assert_eq!(Principal::parse("g3"), Some(Principal::group(3)));
        assert_eq!(Principal::user(7).to_string(), "u7");
        assert_eq!(Principal::group(3).to_string(), "g3");
    }

    #[test]
    fn principal_total_order() {
        let mut v = vec![
            Principal::group(1),
            Principal::user(5),
            Principal::user(1),
            Principal::group(0),
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                Principal::user(1),
                Principal::user(5),
                Principal::group(0),
                Principal::group(1),
            ]
        );
    }

    #[test]
    #[should_panic]
    fn double_allocate_panics() {
        let mut i = I::unallocated(Principal::user(1));
        i.allocate(0);
        i.allocate(1);
    }
}
