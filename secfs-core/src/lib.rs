//! Naming/indirection layer, VSL fork-consistency engine, and
//! inode/directory/block-store model for a secure, multi-principal,
//! untrusted-server file system.
//!
//! `client::Client` is the entry point: it owns the per-session state
//! (registered keys, usermap/groupmap, itable cache, block store handle)
//! and exposes `init`/`pre`/`create`/`mkdir`/`read`/`write`/`readdir`/
//! `link`/`post` as the surface a FUSE frontend would drive.

pub mod access;
pub mod block;
pub mod client;
pub mod directory;
pub mod error;
pub mod fs;
pub mod inode;
pub mod itable;
pub mod types;
pub mod vsl;
pub mod wire;

pub use client::Client;
pub use error::{Result, SecfsError};
pub use types::{GroupId, GroupMap, Principal, User, UserId, UserMap, I};
