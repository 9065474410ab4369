//! Structured object persistence over the content store
//!
//! Trees and commits are written as their canonical encodings (see
//! [`crate::hashing`]) under the hash of those same bytes, through the
//! store's locked save/open primitives. A failed write deletes the partial
//! object before surfacing the error; a load that does not decode cleanly
//! fails with [`crate::StratumError::CorruptObject`].

use crate::error::Result;
use crate::hashing;
use crate::store::ContentStore;
use crate::types::{Commit, ObjectHash, Tree};
use std::io::Write;
use tracing::debug;

/// Serialize a tree into the store, returning its hash
pub fn save_tree(store: &ContentStore, tree: &Tree) -> Result<ObjectHash> {
    let encoded = hashing::encode_tree(tree);
    let hash = hashing::hash_bytes(&encoded);
    write_object(store, &hash, &encoded)?;
    debug!("saved tree {} ({} records)", hash.short(), tree.len());
    Ok(hash)
}

/// Load and decode a tree by hash
pub fn load_tree(store: &ContentStore, hash: &ObjectHash) -> Result<Tree> {
    let bytes = read_object(store, hash)?;
    hashing::decode_tree(&bytes, hash)
}

/// Serialize a commit into the store, returning its hash
pub fn save_commit(store: &ContentStore, commit: &Commit) -> Result<ObjectHash> {
    let encoded = hashing::encode_commit(commit);
    let hash = hashing::hash_bytes(&encoded);
    write_object(store, &hash, &encoded)?;
    debug!("saved commit {}", hash.short());
    Ok(hash)
}

/// Load and decode a commit by hash
pub fn load_commit(store: &ContentStore, hash: &ObjectHash) -> Result<Commit> {
    let bytes = read_object(store, hash)?;
    hashing::decode_commit(&bytes, hash)
}

fn write_object(store: &ContentStore, hash: &ObjectHash, encoded: &[u8]) -> Result<()> {
    let mut handle = store.open_for_saving(hash)?;
    if let Err(e) = handle.write_all(encoded).and_then(|_| handle.flush()) {
        drop(handle);
        store.delete(hash).ok();
        return Err(e.into());
    }
    Ok(())
}

fn read_object(store: &ContentStore, hash: &ObjectHash) -> Result<Vec<u8>> {
    let mut handle = store.open_for_reading(hash)?;
    handle.read_to_end()
}
