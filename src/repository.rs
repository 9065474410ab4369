//! Repository orchestration: layout, branches, HEAD and commits
//!
//! A [`Repository`] ties the content store, object I/O and refs together
//! over the on-disk layout:
//!
//! ```text
//! <working_dir>/<repo_dir>/
//! ├── objects/<hh>/<hash>      # content-addressed blobs, trees, commits
//! ├── refs/heads/<branch>      # empty file, or a commit hash
//! └── HEAD                     # "ref: refs/heads/<branch>" or a raw hash
//! ```
//!
//! Commit creation walks the working directory bottom-up with an explicit
//! work stack (no recursion, so arbitrarily deep trees cannot exhaust the
//! call stack), saving every file as a blob and every directory as a sorted
//! tree, then links the new commit to the commit HEAD resolves to.
//!
//! Concurrent object access is serialized per hash by the store's advisory
//! locks. Branch files and HEAD are *not* lock-protected; two writers
//! committing to the same repository must be serialized externally.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stratum::repository::{Repository, DEFAULT_BRANCH, DEFAULT_REPO_DIR};
//! use std::path::PathBuf;
//!
//! # fn example() -> stratum::Result<()> {
//! let repo = Repository::new(PathBuf::from("."), PathBuf::from(DEFAULT_REPO_DIR));
//! repo.init(DEFAULT_BRANCH)?;
//! let commit_hash = repo.create_commit("Alice", "initial import")?;
//! for entry in repo.commit_history(None)? {
//!     let (hash, commit) = entry?;
//!     println!("{} {}", hash, commit.message);
//! }
//! # Ok(())
//! # }
//! ```

use crate::diff::DiffTree;
use crate::error::{Result, StratumError};
use crate::object_io;
use crate::store::ContentStore;
use crate::types::{Blob, Commit, Head, ObjectHash, RecordKind, Tree, TreeRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default name of the repository directory inside a working directory
pub const DEFAULT_REPO_DIR: &str = ".stratum";

/// Branch created by `init` when the caller does not name one
pub const DEFAULT_BRANCH: &str = "main";

const OBJECTS_SUBDIR: &str = "objects";
const HEADS_SUBDIR: &str = "refs/heads";
const HEAD_FILE: &str = "HEAD";
const HEAD_REF_PREFIX: &str = "ref: ";

/// A version-controlled working directory and its repository state
#[derive(Debug, Clone)]
pub struct Repository {
    working_dir: PathBuf,
    repo_dir: PathBuf,
    lock_timeout: Option<Duration>,
}

impl Repository {
    /// Create a handle for `working_dir` with its repository stored under
    /// `working_dir/repo_dir`
    ///
    /// No filesystem access happens here; call [`Repository::init`] to
    /// create the repository or use the handle against an existing one.
    pub fn new(working_dir: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Self {
        Repository {
            working_dir: working_dir.into(),
            repo_dir: repo_dir.into(),
            lock_timeout: None,
        }
    }

    /// Override the object-lock timeout used by this handle's store
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// The tracked working directory
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Full path of the repository directory
    pub fn repo_path(&self) -> PathBuf {
        self.working_dir.join(&self.repo_dir)
    }

    /// Path of the object store root
    pub fn objects_dir(&self) -> PathBuf {
        self.repo_path().join(OBJECTS_SUBDIR)
    }

    fn heads_dir(&self) -> PathBuf {
        self.repo_path().join(HEADS_SUBDIR)
    }

    fn head_path(&self) -> PathBuf {
        self.repo_path().join(HEAD_FILE)
    }

    fn branch_path(&self, name: &str) -> PathBuf {
        self.heads_dir().join(name)
    }

    /// Whether the repository has been initialized
    pub fn exists(&self) -> bool {
        self.repo_path().exists()
    }

    fn require_repo(&self) -> Result<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(StratumError::NotInitialized(self.repo_path()))
        }
    }

    /// The content store backing this repository
    pub fn store(&self) -> ContentStore {
        let store = ContentStore::new(self.objects_dir());
        match self.lock_timeout {
            Some(timeout) => store.with_lock_timeout(timeout),
            None => store,
        }
    }

    /// Initialize the repository with a single empty branch
    ///
    /// Creates the objects directory, the heads directory, an empty ref file
    /// for `default_branch` and a HEAD file pointing at it. Fails with
    /// [`StratumError::RepositoryExists`] if the repository path already
    /// exists.
    pub fn init(&self, default_branch: &str) -> Result<()> {
        validate_branch_name(default_branch)?;
        let repo_path = self.repo_path();
        if repo_path.exists() {
            return Err(StratumError::RepositoryExists(repo_path));
        }

        fs::create_dir_all(&repo_path)?;
        fs::create_dir_all(self.objects_dir())?;
        fs::create_dir_all(self.heads_dir())?;
        fs::write(self.branch_path(default_branch), b"")?;
        fs::write(
            self.head_path(),
            format!("{HEAD_REF_PREFIX}{HEADS_SUBDIR}/{default_branch}"),
        )?;

        info!("initialized repository at {:?}", repo_path);
        Ok(())
    }

    /// Remove the entire repository directory
    pub fn delete_repo(&self) -> Result<()> {
        self.require_repo()?;
        fs::remove_dir_all(self.repo_path())?;
        info!("deleted repository at {:?}", self.repo_path());
        Ok(())
    }

    /// Save one file's content into the object store
    pub fn save_file_content(&self, path: &Path) -> Result<Blob> {
        self.require_repo()?;
        self.store().save_file(path)
    }

    /// Create a branch ref; an existing branch is left untouched
    pub fn add_branch(&self, name: &str) -> Result<()> {
        self.require_repo()?;
        validate_branch_name(name)?;
        let path = self.branch_path(name);
        if path.exists() {
            warn!("branch '{}' already exists", name);
            return Ok(());
        }
        fs::write(path, b"")?;
        debug!("created branch '{}'", name);
        Ok(())
    }

    /// Delete a branch ref
    ///
    /// Fails with [`StratumError::BranchNotFound`] if the branch does not
    /// exist, and with [`StratumError::LastBranch`] if it is the only branch
    /// left — a repository always keeps at least one branch.
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.require_repo()?;
        let path = self.branch_path(name);
        if !path.exists() {
            return Err(StratumError::BranchNotFound(name.to_string()));
        }
        if self.list_branches()?.len() <= 1 {
            return Err(StratumError::LastBranch(name.to_string()));
        }
        fs::remove_file(path)?;
        debug!("deleted branch '{}'", name);
        Ok(())
    }

    /// Whether a branch ref exists
    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        self.require_repo()?;
        Ok(self.branch_path(name).exists())
    }

    /// All branch names, sorted for stable listing
    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.require_repo()?;
        let mut branches = Vec::new();
        for entry in fs::read_dir(self.heads_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry
                    .file_name()
                    .into_string()
                    .map_err(StratumError::PathConversion)?;
                branches.push(name);
            }
        }
        branches.sort();
        Ok(branches)
    }

    /// Parse the HEAD file
    pub fn head(&self) -> Result<Head> {
        self.require_repo()?;
        let content = fs::read_to_string(self.head_path())?;
        let content = content.trim();
        if let Some(ref_path) = content.strip_prefix(HEAD_REF_PREFIX) {
            let name = ref_path.strip_prefix(&format!("{HEADS_SUBDIR}/")).ok_or_else(|| {
                StratumError::corrupt("HEAD", format!("unrecognized ref target {ref_path:?}"))
            })?;
            Ok(Head::Branch(name.to_string()))
        } else {
            let hash = ObjectHash::from_str(content).map_err(|_| {
                StratumError::corrupt("HEAD", format!("neither a ref nor a hash: {content:?}"))
            })?;
            Ok(Head::Detached(hash))
        }
    }

    /// The commit HEAD currently points at, if any
    ///
    /// Returns `Ok(None)` while the active branch has no commit yet (its
    /// ref file is empty or absent).
    pub fn resolve_head(&self) -> Result<Option<ObjectHash>> {
        match self.head()? {
            Head::Detached(hash) => Ok(Some(hash)),
            Head::Branch(name) => {
                let content = match fs::read_to_string(self.branch_path(&name)) {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let content = content.trim();
                if content.is_empty() {
                    return Ok(None);
                }
                let hash = ObjectHash::from_str(content).map_err(|_| {
                    StratumError::corrupt(
                        format!("refs/heads/{name}"),
                        format!("not a commit hash: {content:?}"),
                    )
                })?;
                Ok(Some(hash))
            }
        }
    }

    fn update_head(&self, new_hash: &ObjectHash) -> Result<()> {
        match self.head()? {
            Head::Branch(name) => fs::write(self.branch_path(&name), new_hash.as_str())?,
            Head::Detached(_) => fs::write(self.head_path(), new_hash.as_str())?,
        }
        Ok(())
    }

    /// Snapshot the working directory as a new commit
    ///
    /// Walks the working directory (excluding the repository's own
    /// subdirectory), saving files as blobs and directories as trees
    /// bottom-up, then records a commit whose parent is the current HEAD
    /// commit (or none for the first commit) and advances the active branch
    /// — or HEAD itself when detached — to the new commit hash.
    pub fn create_commit(&self, author: &str, message: &str) -> Result<ObjectHash> {
        self.require_repo()?;
        if author.is_empty() {
            return Err(StratumError::invalid_argument("author must not be empty"));
        }
        if message.is_empty() {
            return Err(StratumError::invalid_argument("message must not be empty"));
        }
        if !self.working_dir.is_dir() {
            return Err(StratumError::invalid_argument(format!(
                "working directory {:?} is not a directory",
                self.working_dir
            )));
        }

        let store = self.store();
        let root_hash = self.build_tree_bottom_up(&store)?;
        let parent = self.resolve_head()?;

        let commit = Commit::new(
            root_hash,
            author,
            message,
            Utc::now().timestamp(),
            parent,
        );
        let commit_hash = object_io::save_commit(&store, &commit)?;
        self.update_head(&commit_hash)?;

        info!("created commit {}", commit_hash.short());
        Ok(commit_hash)
    }

    /// Convert every directory under the working dir into a saved tree
    ///
    /// Explicit work-stack: a directory is converted only once all of its
    /// subdirectories have been converted and their hashes memoized, so each
    /// subtree is processed exactly once regardless of depth.
    fn build_tree_bottom_up(&self, store: &ContentStore) -> Result<ObjectHash> {
        let repo_path = self.repo_path();
        let mut finished: HashMap<PathBuf, ObjectHash> = HashMap::new();
        let mut stack = vec![self.working_dir.clone()];

        while let Some(dir) = stack.pop() {
            if finished.contains_key(&dir) {
                continue;
            }

            let mut pending_subdirs = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path == repo_path {
                    continue;
                }
                if entry.file_type()?.is_dir() && !finished.contains_key(&path) {
                    pending_subdirs.push(path);
                }
            }

            if !pending_subdirs.is_empty() {
                // Revisit this directory once its children are converted
                stack.push(dir);
                stack.extend(pending_subdirs);
                continue;
            }

            let mut tree = Tree::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path == repo_path {
                    continue;
                }
                let name = entry
                    .file_name()
                    .into_string()
                    .map_err(StratumError::PathConversion)?;
                let file_type = entry.file_type()?;
                if file_type.is_file() {
                    let blob = store.save_file(&path)?;
                    tree.insert(TreeRecord::new(RecordKind::Blob, blob.hash, name));
                } else if file_type.is_dir() {
                    let subtree_hash = finished[&path].clone();
                    tree.insert(TreeRecord::new(RecordKind::Tree, subtree_hash, name));
                } else {
                    debug!("skipping non-regular entry {:?}", path);
                }
            }

            let tree_hash = object_io::save_tree(store, &tree)?;
            finished.insert(dir, tree_hash);
        }

        Ok(finished
            .remove(&self.working_dir)
            .expect("root directory is always converted"))
    }

    /// Iterate the commit chain starting from `start` (HEAD if `None`)
    ///
    /// The iterator yields `(hash, commit)` pairs following parent links
    /// until the root commit; a commit that fails to load surfaces as an
    /// error item.
    pub fn commit_history(&self, start: Option<ObjectHash>) -> Result<History> {
        self.require_repo()?;
        let next = match start {
            Some(hash) => Some(hash),
            None => self.resolve_head()?,
        };
        Ok(History {
            store: self.store(),
            next,
        })
    }

    /// Compare the trees of two commits
    pub fn diff_commits(&self, from: &ObjectHash, to: &ObjectHash) -> Result<DiffTree> {
        self.require_repo()?;
        crate::diff::diff_commits(&self.store(), from, to)
    }
}

fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StratumError::invalid_argument("branch name must not be empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StratumError::invalid_argument(format!(
            "invalid branch name: {name:?}"
        )));
    }
    Ok(())
}

/// Lazy walk over a commit chain, oldest link last
pub struct History {
    store: ContentStore,
    next: Option<ObjectHash>,
}

impl Iterator for History {
    type Item = Result<(ObjectHash, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        match object_io::load_commit(&self.store, &hash) {
            Ok(commit) => {
                self.next = commit.parent.clone();
                Some(Ok((hash, commit)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
