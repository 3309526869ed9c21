//! End-to-end scenarios driven entirely through `Client`, against a shared
//! `InMemoryBlockServer` playing the untrusted server. Each test is
//! grounded in one of the walkthroughs from spec.md §8.

use std::collections::BTreeMap;
use std::sync::Arc;

use secfs_core::block::{BlockServer, InMemoryBlockServer};
use secfs_core::client::{encode_groupmap, encode_usermap};
use secfs_core::inode::Kind;
use secfs_core::vsl::VersionStruct;
use secfs_core::{Client, GroupId, GroupMap, Principal, SecfsError, User, UserMap};
use secfs_crypto::{gen_keypair, sign, SignatureBytes};

#[test]
fn init_and_root_listing() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let (_pk0, sk0) = gen_keypair();
    let mut client = Client::new(server);
    client.register_key(user0, sk0);

    let root = client.init_single_user(user0).unwrap();
    let entries = client.readdir(root, 0, user0).unwrap();
    let mut names: Vec<String> = entries.into_iter().map(|(e, _)| e.name).collect();
    names.sort();
    assert_eq!(names, vec![".", "..", ".groups", ".users"]);
}

#[test]
fn private_file_round_trip() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let (_pk0, sk0) = gen_keypair();
    let mut client = Client::new(server);
    client.register_key(user0, sk0);

    let root = client.init_single_user(user0).unwrap();
    let file_i = client.create(root, "hello", user0, user0.principal(), false, Kind::File).unwrap();
    client.write(user0, file_i, 0, b"world").unwrap();
    assert_eq!(client.read(user0, file_i, 0, 5).unwrap(), b"world");
}

#[test]
fn encrypted_file_denies_outsider() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let user1 = User::new(1);
    let (pk0, sk0) = gen_keypair();
    let (pk1, sk1) = gen_keypair();

    let mut usermap = UserMap::new();
    usermap.insert(user0, pk0);
    usermap.insert(user1, pk1);
    let users_blob = encode_usermap(&usermap).unwrap();
    let groups_blob = encode_groupmap(&GroupMap::new());

    let mut client0 = Client::new(server.clone());
    client0.register_key(user0, sk0);
    let root = client0.init(user0, &users_blob, &groups_blob).unwrap();

    let file_i = client0.create(root, "secret.txt", user0, user0.principal(), true, Kind::File).unwrap();
    client0.write(user0, file_i, 0, b"secret").unwrap();
    assert_eq!(client0.read(user0, file_i, 0, 6).unwrap(), b"secret");

    let mut client1 = Client::new(server);
    client1.register_key(user1, sk1);
    let err = client1.read(user1, file_i, 0, 6).unwrap_err();
    assert!(matches!(err, SecfsError::PermissionDenied));
}

#[test]
fn group_write_indirection_reassigns_owner() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let user1 = User::new(1);
    let g = GroupId(0);
    let (pk0, sk0) = gen_keypair();
    let (pk1, sk1) = gen_keypair();

    let mut usermap = UserMap::new();
    usermap.insert(user0, pk0);
    usermap.insert(user1, pk1);
    let mut groupmap = GroupMap::new();
    groupmap.insert(g, vec![user0, user1]);
    let users_blob = encode_usermap(&usermap).unwrap();
    let groups_blob = encode_groupmap(&groupmap);

    let mut client0 = Client::new(server.clone());
    client0.register_key(user0, sk0);
    let root = client0.init(user0, &users_blob, &groups_blob).unwrap();

    let shared_i = client0.create(root, "shared.txt", user0, Principal::Group(g), false, Kind::File).unwrap();
    client0.write(user0, shared_i, 0, b"a").unwrap();
    client0.post(user0, true).unwrap();
    assert_eq!(client0.read(user0, shared_i, 0, 1).unwrap(), b"a");

    let mut client1 = Client::new(server.clone());
    client1.register_key(user1, sk1);
    client1.set_root(root);
    client1.seed_trust(usermap, groupmap);
    client1.pre(user1).unwrap();

    client1.write(user1, shared_i, 0, b"b").unwrap();
    client1.post(user1, true).unwrap();

    client0.pre(user0).unwrap();
    assert_eq!(client0.read(user0, shared_i, 0, 1).unwrap(), b"b");
}

#[test]
fn write_denied_to_non_member_of_owning_group() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let user1 = User::new(1);
    let outsider = User::new(2);
    let g = GroupId(0);
    let (pk0, sk0) = gen_keypair();
    let (pk1, _sk1) = gen_keypair();
    let (pk2, sk2) = gen_keypair();

    let mut usermap = UserMap::new();
    usermap.insert(user0, pk0);
    usermap.insert(user1, pk1);
    usermap.insert(outsider, pk2);
    let mut groupmap = GroupMap::new();
    groupmap.insert(g, vec![user0, user1]);
    let users_blob = encode_usermap(&usermap).unwrap();
    let groups_blob = encode_groupmap(&groupmap);

    let mut client0 = Client::new(server.clone());
    client0.register_key(user0, sk0);
    let root = client0.init(user0, &users_blob, &groups_blob).unwrap();
    let shared_i = client0.create(root, "shared.txt", user0, Principal::Group(g), false, Kind::File).unwrap();
    client0.write(user0, shared_i, 0, b"a").unwrap();
    client0.post(user0, true).unwrap();

    let mut outsider_client = Client::new(server);
    outsider_client.register_key(outsider, sk2);
    outsider_client.seed_trust(usermap, groupmap);
    let err = outsider_client.write(outsider, shared_i, 0, b"z").unwrap_err();
    assert!(matches!(err, SecfsError::PermissionDenied));
}

#[test]
fn fork_detected_when_committed_vs_regresses() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let (_pk0, sk0) = gen_keypair();
    let mut client = Client::new(server.clone());
    client.register_key(user0, sk0);

    let root = client.init_single_user(user0).unwrap();
    client.post(user0, true).unwrap();
    let stale = server.get_vsl().unwrap().get(&user0.to_string()).cloned().unwrap();

    let file_i = client.create(root, "a.txt", user0, user0.principal(), false, Kind::File).unwrap();
    client.write(user0, file_i, 0, b"x").unwrap();
    client.post(user0, true).unwrap();

    // A malicious server rolls the committed VS back to the earlier snapshot.
    server.commit(user0, stale).unwrap();

    let err = client.pre(user0).unwrap_err();
    assert!(matches!(err, SecfsError::ForkDetected));
}

#[test]
fn fork_detected_when_vsl_not_totally_ordered() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let user1 = User::new(1);
    let g = GroupId(0);
    let (pk0, sk0) = gen_keypair();
    let (pk1, sk1) = gen_keypair();

    let mut usermap = UserMap::new();
    usermap.insert(user0, pk0);
    usermap.insert(user1, pk1);
    let mut groupmap = GroupMap::new();
    groupmap.insert(g, vec![user0, user1]);
    let users_blob = encode_usermap(&usermap).unwrap();
    let groups_blob = encode_groupmap(&groupmap);

    let mut client0 = Client::new(server.clone());
    client0.register_key(user0, sk0);
    let root = client0.init(user0, &users_blob, &groups_blob).unwrap();
    let shared_i = client0.create(root, "shared.txt", user0, Principal::Group(g), false, Kind::File).unwrap();
    client0.write(user0, shared_i, 0, b"a").unwrap();
    client0.post(user0, true).unwrap();

    let real = VersionStruct::from_dict(&server.get_vsl().unwrap().get(&user0.to_string()).cloned().unwrap()).unwrap();

    // Flip one component up and another down relative to the real VS, so
    // neither vector dominates the other no matter the starting values.
    let mut versions: BTreeMap<Principal, u64> = real.versions.clone();
    for (p, v) in versions.iter_mut() {
        *v = if *p == user0.principal() { *v + 1 } else { 0 };
    }
    let mut fake = VersionStruct {
        principal: user1,
        ihandles: BTreeMap::new(),
        versions,
        signature: SignatureBytes(Vec::new()),
    };
    fake.signature = sign(&sk1, &fake.bytes());
    server.commit(user1, fake.to_dict()).unwrap();

    let mut client1 = Client::new(server);
    client1.register_key(user1, sk1);
    client1.seed_trust(usermap, groupmap);
    let err = client1.pre(user1).unwrap_err();
    assert!(matches!(err, SecfsError::ForkDetected));
}

#[test]
fn signature_tampering_fails_verification() {
    let server = Arc::new(InMemoryBlockServer::new());
    let user0 = User::new(0);
    let (_pk0, sk0) = gen_keypair();
    let mut client = Client::new(server.clone());
    client.register_key(user0, sk0);

    client.init_single_user(user0).unwrap();
    client.post(user0, true).unwrap();

    let mut dict = server.get_vsl().unwrap().get(&user0.to_string()).cloned().unwrap();
    let mut sig = hex::decode(&dict.signature).unwrap();
    sig[0] ^= 0xFF;
    dict.signature = hex::encode(sig);
    server.commit(user0, dict).unwrap();

    let err = client.pre(user0).unwrap_err();
    assert!(matches!(err, SecfsError::BadSignature));
}
