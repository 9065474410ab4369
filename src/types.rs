//! Core data types used throughout the stratum library
//!
//! This module contains the value types of the object model: hashes, tree
//! records, trees, commits and the HEAD reference. All of them are plain
//! immutable data; once an object has been persisted under its hash it is
//! never rewritten, so these types are safe to share across threads for
//! reading.
//!
//! ## Object identity
//!
//! Every stored object is identified by an [`ObjectHash`]: the SHA-1 digest
//! of the object's canonical encoding, rendered as 40 lowercase hex
//! characters. Two structurally equal trees or commits always produce the
//! same hash regardless of how they were built (see [`crate::hashing`]).

use crate::error::{Result, StratumError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of hex characters in an object hash (SHA-1, 160 bits)
pub const HASH_LEN: usize = 40;

/// A validated 40-character lowercase hexadecimal object hash
///
/// The identity of every stored object. Construction goes through
/// [`ObjectHash::from_digest`] (from raw digest bytes) or [`FromStr`]
/// (validating user-supplied strings), so a value of this type is always a
/// well-formed hash.
///
/// # Examples
///
/// ```rust
/// use stratum::types::ObjectHash;
///
/// let hash: ObjectHash = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3".parse().unwrap();
/// assert_eq!(hash.prefix(), "a9");
/// assert!("not a hash".parse::<ObjectHash>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHash(String);

impl ObjectHash {
    /// Build a hash from raw digest bytes
    pub fn from_digest(digest: &[u8]) -> Self {
        ObjectHash(hex::encode(digest))
    }

    /// The full hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two hex characters, used as the shard directory name
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// Abbreviated form for log messages
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl FromStr for ObjectHash {
    type Err = StratumError;

    fn from_str(s: &str) -> Result<Self> {
        let valid = s.len() == HASH_LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(ObjectHash(s.to_string()))
        } else {
            Err(StratumError::InvalidHash(s.to_string()))
        }
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raw file content saved in the store, addressed by the hash of its bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// SHA-1 hash of the file content
    pub hash: ObjectHash,
}

/// Kind of entry a [`TreeRecord`] points at
///
/// The discriminants are the tags used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordKind {
    /// File content
    Blob = 0,
    /// Nested directory
    Tree = 1,
}

impl RecordKind {
    /// Wire tag for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag back into a kind
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(RecordKind::Blob),
            1 => Some(RecordKind::Tree),
            _ => None,
        }
    }
}

/// One directory entry: a named pointer to a blob or a subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    /// Whether this entry is file content or a nested tree
    pub kind: RecordKind,
    /// Hash of the referenced object
    pub hash: ObjectHash,
    /// Entry name, unique within the enclosing tree
    pub name: String,
}

impl TreeRecord {
    /// Create a new record
    pub fn new(kind: RecordKind, hash: ObjectHash, name: impl Into<String>) -> Self {
        TreeRecord {
            kind,
            hash,
            name: name.into(),
        }
    }
}

/// A sorted directory listing of named entries
///
/// Records are kept in a `BTreeMap` keyed by entry name, so iteration and
/// serialization always happen in sorted-name order. This makes the hash of
/// a tree independent of insertion order: two trees with the same records
/// hash identically no matter how they were assembled.
///
/// # Examples
///
/// ```rust
/// use stratum::types::{RecordKind, Tree, TreeRecord};
///
/// let mut tree = Tree::new();
/// let hash = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3".parse().unwrap();
/// tree.insert(TreeRecord::new(RecordKind::Blob, hash, "file.txt"));
/// assert_eq!(tree.len(), 1);
/// assert!(tree.get("file.txt").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    records: BTreeMap<String, TreeRecord>,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Tree::default()
    }

    /// Insert a record, keyed by its name
    ///
    /// A record with the same name replaces the previous one; names are
    /// unique within a tree by construction.
    pub fn insert(&mut self, record: TreeRecord) {
        self.records.insert(record.name.clone(), record);
    }

    /// Look up a record by entry name
    pub fn get(&self, name: &str) -> Option<&TreeRecord> {
        self.records.get(name)
    }

    /// All records in sorted-name order
    pub fn records(&self) -> impl Iterator<Item = &TreeRecord> {
        self.records.values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compute this tree's object hash from its canonical encoding
    pub fn hash(&self) -> ObjectHash {
        crate::hashing::hash_tree(self)
    }
}

impl FromIterator<TreeRecord> for Tree {
    fn from_iter<I: IntoIterator<Item = TreeRecord>>(iter: I) -> Self {
        let mut tree = Tree::new();
        for record in iter {
            tree.insert(record);
        }
        tree
    }
}

/// An immutable snapshot record linking a tree to authorship metadata
///
/// `parent` is `None` only for the first commit on a history line. The hash
/// covers all five fields; a missing parent hashes distinguishably from any
/// real parent hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Hash of the root tree this commit snapshots
    pub tree_hash: ObjectHash,
    /// Author of the commit
    pub author: String,
    /// Commit message
    pub message: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Parent commit hash, `None` for a root commit
    pub parent: Option<ObjectHash>,
}

impl Commit {
    /// Create a new commit value
    pub fn new(
        tree_hash: ObjectHash,
        author: impl Into<String>,
        message: impl Into<String>,
        timestamp: i64,
        parent: Option<ObjectHash>,
    ) -> Self {
        Commit {
            tree_hash,
            author: author.into(),
            message: message.into(),
            timestamp,
            parent,
        }
    }

    /// Compute this commit's object hash from its canonical encoding
    pub fn hash(&self) -> ObjectHash {
        crate::hashing::hash_commit(self)
    }
}

/// The repository's current position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// Symbolic reference to a branch by name
    Branch(String),
    /// Detached: a raw commit hash
    Detached(ObjectHash),
}
