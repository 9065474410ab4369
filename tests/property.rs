//! Property-based tests for the object model invariants: hashing
//! determinism, insertion-order independence, field sensitivity and
//! persistence round-trips.

use proptest::prelude::*;
use std::collections::BTreeMap;
use stratum::hashing::{self, hash_bytes};
use stratum::object_io;
use stratum::store::ContentStore;
use stratum::types::{Commit, ObjectHash, RecordKind, Tree, TreeRecord};
use tempfile::TempDir;

fn tree_entries_strategy() -> impl Strategy<Value = BTreeMap<String, (RecordKind, ObjectHash)>> {
    prop::collection::btree_map(
        "[a-zA-Z0-9._ -]{1,16}",
        (
            prop_oneof![Just(RecordKind::Blob), Just(RecordKind::Tree)],
            any::<[u8; 8]>().prop_map(|seed| hash_bytes(&seed)),
        ),
        0..12,
    )
}

fn tree_from(entries: &BTreeMap<String, (RecordKind, ObjectHash)>) -> Tree {
    entries
        .iter()
        .map(|(name, (kind, hash))| TreeRecord::new(*kind, hash.clone(), name.clone()))
        .collect()
}

fn commit_strategy() -> impl Strategy<Value = Commit> {
    (
        any::<[u8; 8]>().prop_map(|seed| hash_bytes(&seed)),
        "[a-zA-Z ]{1,20}",
        ".{0,64}",
        any::<i64>(),
        prop::option::of(any::<[u8; 8]>().prop_map(|seed| hash_bytes(&seed))),
    )
        .prop_map(|(tree_hash, author, message, timestamp, parent)| {
            Commit::new(tree_hash, author, message, timestamp, parent)
        })
}

proptest! {
    #[test]
    fn hash_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        prop_assert_eq!(hash_bytes(&data), hash_bytes(&data));
    }

    #[test]
    fn distinct_bytes_hash_distinctly(
        a in prop::collection::vec(any::<u8>(), 0..256),
        b in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(hash_bytes(&a), hash_bytes(&b));
    }

    #[test]
    fn tree_hash_is_insertion_order_independent(
        entries in tree_entries_strategy(),
        order in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let records: Vec<TreeRecord> = tree_from(&entries).records().cloned().collect();

        // Build the same tree following an arbitrary insertion order
        let mut shuffled: Vec<TreeRecord> = Vec::new();
        let mut remaining = records.clone();
        for pick in order {
            if remaining.is_empty() {
                break;
            }
            shuffled.push(remaining.remove(pick % remaining.len()));
        }
        shuffled.extend(remaining);

        let forward: Tree = records.into_iter().collect();
        let reordered: Tree = shuffled.into_iter().collect();

        prop_assert_eq!(hashing::encode_tree(&forward), hashing::encode_tree(&reordered));
        prop_assert_eq!(forward.hash(), reordered.hash());
    }

    #[test]
    fn commit_hash_is_sensitive_to_every_field(commit in commit_strategy()) {
        let base = commit.hash();

        let mut changed = commit.clone();
        changed.tree_hash = hash_bytes(b"other tree");
        prop_assume!(changed.tree_hash != commit.tree_hash);
        prop_assert_ne!(changed.hash(), base.clone());

        let mut changed = commit.clone();
        changed.author.push('!');
        prop_assert_ne!(changed.hash(), base.clone());

        let mut changed = commit.clone();
        changed.message.push('!');
        prop_assert_ne!(changed.hash(), base.clone());

        let mut changed = commit.clone();
        changed.timestamp = commit.timestamp.wrapping_add(1);
        prop_assert_ne!(changed.hash(), base.clone());

        // Flipping between no parent and some parent always changes the hash
        let mut changed = commit.clone();
        changed.parent = match &commit.parent {
            None => Some(hash_bytes(b"adopted parent")),
            Some(_) => None,
        };
        prop_assert_ne!(changed.hash(), base);
    }

    #[test]
    fn tree_round_trips_through_store(entries in tree_entries_strategy()) {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path().join("objects"));
        let tree = tree_from(&entries);

        let hash = object_io::save_tree(&store, &tree).unwrap();
        let loaded = object_io::load_tree(&store, &hash).unwrap();
        prop_assert_eq!(loaded, tree);
    }

    #[test]
    fn commit_round_trips_through_store(commit in commit_strategy()) {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path().join("objects"));

        let hash = object_io::save_commit(&store, &commit).unwrap();
        let loaded = object_io::load_commit(&store, &hash).unwrap();
        prop_assert_eq!(loaded, commit);
    }

    #[test]
    fn structurally_equal_objects_share_an_encoding(entries in tree_entries_strategy()) {
        let first = tree_from(&entries);
        let second = tree_from(&entries);
        prop_assert_eq!(hashing::encode_tree(&first), hashing::encode_tree(&second));
        prop_assert_eq!(first.hash(), second.hash());
    }
}
