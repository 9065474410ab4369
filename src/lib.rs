//! # stratum - content-addressed version control
//!
//! A miniature version-control engine: file content, directory trees and
//! commits are stored in an on-disk repository addressed by SHA-1 content
//! hash, with branch management, commit history traversal and recursive
//! tree diffing including rename/move detection.
//!
//! ## Overview
//!
//! stratum gives you the storage core of a version-control system:
//! - Snapshot a working directory into an immutable commit
//! - Deduplicate file content automatically via content addressing
//! - Manage branches and a symbolic or detached HEAD
//! - Walk commit history lazily through parent links
//! - Diff any two commits, with moves detected across subtrees
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratum::repository::{Repository, DEFAULT_BRANCH, DEFAULT_REPO_DIR};
//! use std::path::PathBuf;
//!
//! # fn main() -> stratum::Result<()> {
//! let repo = Repository::new(PathBuf::from("."), PathBuf::from(DEFAULT_REPO_DIR));
//! repo.init(DEFAULT_BRANCH)?;
//!
//! // Snapshot the working directory
//! let first = repo.create_commit("Alice", "initial import")?;
//!
//! // ... edit files ...
//!
//! let second = repo.create_commit("Alice", "rework layout")?;
//!
//! // What changed?
//! let diff = repo.diff_commits(&first, &second)?;
//! println!("{} top-level changes", diff.roots().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`hashing`]: SHA-1 content hashing and the canonical object encodings
//! - [`types`]: the object model — hashes, trees, commits, HEAD
//! - [`store`]: sharded content-addressable storage with advisory file locks
//! - [`object_io`]: tree/commit persistence over the store
//! - [`repository`]: branches, HEAD, commit creation and history
//! - [`diff`]: recursive tree comparison with move detection
//! - [`error`]: error types and handling
//!
//! ## Concurrency
//!
//! All calls are synchronous. Readers and writers of the same object are
//! serialized by per-hash advisory file locks with a bounded wait; objects
//! are immutable once written, so operations on different hashes never
//! contend. Commit creation against the same repository from multiple
//! writers requires external serialization.

pub mod diff;
pub mod error;
pub mod hashing;
pub mod object_io;
pub mod repository;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use diff::{DiffId, DiffKind, DiffNode, DiffSummary, DiffTree};
pub use error::{Result, StratumError};
pub use repository::{History, Repository, DEFAULT_BRANCH, DEFAULT_REPO_DIR};
pub use store::{ContentStore, LockedFile};
pub use types::{Blob, Commit, Head, ObjectHash, RecordKind, Tree, TreeRecord};
