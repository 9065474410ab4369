//! Recursive tree comparison with move detection
//!
//! The diff engine compares the trees of two commits level by level,
//! reporting entries that were added, removed or modified, and upgrading
//! matching removed/added pairs into linked moves when the same content
//! hash disappears from one location and reappears at another — even across
//! different subtrees.
//!
//! ## Result shape
//!
//! Results come back as a [`DiffTree`]: an arena of [`DiffNode`]s referenced
//! by [`DiffId`] indices. Nodes form a forest — the top-level entries of the
//! comparison are the roots — and a node's children are only non-empty when
//! it represents a directory whose contents differ. The arena representation
//! lets the two halves of a move reference each other without reference
//! cycles, and lets a provisional `Added`/`Removed` node be upgraded in
//! place when its counterpart shows up later in the traversal.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stratum::diff::{diff_commits, DiffKind};
//! use stratum::store::ContentStore;
//!
//! # fn example() -> stratum::Result<()> {
//! # let store = ContentStore::new("/tmp/objects");
//! # let (from, to) = (stratum::hashing::hash_bytes(b"a"), stratum::hashing::hash_bytes(b"b"));
//! let diff = diff_commits(&store, &from, &to)?;
//! for &root in diff.roots() {
//!     let node = diff.node(root);
//!     println!("{:?} {}", node.kind, node.record.name);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::object_io;
use crate::store::ContentStore;
use crate::types::{ObjectHash, RecordKind, Tree, TreeRecord};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Index of a node within a [`DiffTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiffId(usize);

/// What happened to one tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Entry exists only on the target side
    Added,
    /// Entry exists only on the source side
    Removed,
    /// Entry exists on both sides with differing content
    Modified,
    /// Entry left this location; the payload is the `MovedTo` counterpart
    /// at its new location
    MovedFrom(DiffId),
    /// Entry arrived at this location; the payload is the `MovedFrom`
    /// counterpart at its old location
    MovedTo(DiffId),
}

/// One entry of the comparison result
#[derive(Debug, Clone)]
pub struct DiffNode {
    /// How this entry changed
    pub kind: DiffKind,
    /// The tree record the change applies to
    pub record: TreeRecord,
    /// Enclosing directory node, `None` for top-level entries
    pub parent: Option<DiffId>,
    /// Nested changes, non-empty only for modified directories
    pub children: Vec<DiffId>,
}

/// Arena-backed forest of diff nodes
#[derive(Debug, Clone, Default)]
pub struct DiffTree {
    nodes: Vec<DiffNode>,
    roots: Vec<DiffId>,
}

impl DiffTree {
    /// Top-level changed entries, in traversal order
    pub fn roots(&self) -> &[DiffId] {
        &self.roots
    }

    /// Resolve a node id
    pub fn node(&self, id: DiffId) -> &DiffNode {
        &self.nodes[id.0]
    }

    /// Total number of nodes in the forest
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the comparison found no differences
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate every node with its id
    pub fn iter(&self) -> impl Iterator<Item = (DiffId, &DiffNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (DiffId(i), n))
    }

    /// Count changes by kind
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for node in &self.nodes {
            match node.kind {
                DiffKind::Added => summary.added += 1,
                DiffKind::Removed => summary.removed += 1,
                DiffKind::Modified => summary.modified += 1,
                // Count each linked pair once, from its old location
                DiffKind::MovedFrom(_) => summary.moved += 1,
                DiffKind::MovedTo(_) => {}
            }
        }
        summary
    }

    fn alloc(&mut self, kind: DiffKind, record: TreeRecord, parent: Option<DiffId>) -> DiffId {
        let id = DiffId(self.nodes.len());
        self.nodes.push(DiffNode {
            kind,
            record,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(parent_id) => self.nodes[parent_id.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }
}

/// Aggregate change counts for a [`DiffTree`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Entries added
    pub added: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries modified
    pub modified: usize,
    /// Linked move pairs
    pub moved: usize,
}

/// Compare the trees of two commits
///
/// Commits whose root trees hash identically short-circuit to an empty
/// result without loading any tree.
pub fn diff_commits(store: &ContentStore, from: &ObjectHash, to: &ObjectHash) -> Result<DiffTree> {
    let from_commit = object_io::load_commit(store, from)?;
    let to_commit = object_io::load_commit(store, to)?;

    if from_commit.tree_hash == to_commit.tree_hash {
        debug!("commits {} and {} share a tree", from.short(), to.short());
        return Ok(DiffTree::default());
    }

    let from_tree = object_io::load_tree(store, &from_commit.tree_hash)?;
    let to_tree = object_io::load_tree(store, &to_commit.tree_hash)?;
    diff_trees(store, from_tree, to_tree)
}

/// Compare two loaded trees recursively
pub fn diff_trees(store: &ContentStore, from: Tree, to: Tree) -> Result<DiffTree> {
    let mut out = DiffTree::default();

    // Unmatched removals/additions seen anywhere in the traversal so far,
    // keyed by content hash. Shared across the whole walk so a move between
    // different subtrees is still detected.
    let mut pending_removed: HashMap<ObjectHash, DiffId> = HashMap::new();
    let mut pending_added: HashMap<ObjectHash, DiffId> = HashMap::new();

    let mut stack: Vec<(Tree, Tree, Option<DiffId>)> = vec![(from, to, None)];

    while let Some((from_tree, to_tree, parent)) = stack.pop() {
        for from_record in from_tree.records() {
            match to_tree.get(&from_record.name) {
                None => {
                    // Gone from this location: either half of a move, or a
                    // genuine removal.
                    if let Some(added_id) = pending_added.remove(&from_record.hash) {
                        let removed_id =
                            out.alloc(DiffKind::MovedFrom(added_id), from_record.clone(), parent);
                        out.nodes[added_id.0].kind = DiffKind::MovedTo(removed_id);
                    } else {
                        let id = out.alloc(DiffKind::Removed, from_record.clone(), parent);
                        pending_removed.insert(from_record.hash.clone(), id);
                    }
                }
                Some(to_record) if to_record.hash == from_record.hash => {}
                Some(to_record) => {
                    if from_record.kind == RecordKind::Tree && to_record.kind == RecordKind::Tree {
                        let id = out.alloc(DiffKind::Modified, to_record.clone(), parent);
                        let from_subtree = object_io::load_tree(store, &from_record.hash)?;
                        let to_subtree = object_io::load_tree(store, &to_record.hash)?;
                        stack.push((from_subtree, to_subtree, Some(id)));
                    } else {
                        // Blob content change, or the entry changed kind
                        out.alloc(DiffKind::Modified, to_record.clone(), parent);
                    }
                }
            }
        }

        for to_record in to_tree.records() {
            if from_tree.get(&to_record.name).is_some() {
                continue;
            }
            if let Some(removed_id) = pending_removed.remove(&to_record.hash) {
                let added_id = out.alloc(DiffKind::MovedTo(removed_id), to_record.clone(), parent);
                out.nodes[removed_id.0].kind = DiffKind::MovedFrom(added_id);
            } else {
                let id = out.alloc(DiffKind::Added, to_record.clone(), parent);
                pending_added.insert(to_record.hash.clone(), id);
            }
        }
    }

    Ok(out)
}
