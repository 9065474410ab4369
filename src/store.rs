//! Content-addressable storage backend
//!
//! This module maps object hashes to files on disk. Objects live in a
//! two-level sharded layout under the store root — the first two hex
//! characters of the hash name the shard directory, the full hash names the
//! file:
//!
//! ```text
//! <root>/
//! └── <hh>/
//!     └── <hash>
//! ```
//!
//! Once written under its hash an object is immutable and never rewritten
//! with different content, so readers of *different* objects never need to
//! coordinate with writers. Readers and writers of the *same* object are
//! serialized with advisory file locks: writers take an exclusive lock,
//! readers a shared one, and a contended lock is retried until the store's
//! lock timeout elapses, at which point the operation fails with
//! [`StratumError::LockTimeout`] instead of blocking forever or corrupting
//! data.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stratum::store::ContentStore;
//! use std::io::Read;
//! use std::path::Path;
//!
//! # fn example() -> stratum::Result<()> {
//! let store = ContentStore::new("/tmp/objects");
//! let blob = store.save_file(Path::new("notes.txt"))?;
//!
//! let mut handle = store.open_for_reading(&blob.hash)?;
//! let mut content = String::new();
//! handle.read_to_string(&mut content)?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, StratumError};
use crate::hashing;
use crate::types::{Blob, ObjectHash};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How long lock acquisition may retry before giving up
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between lock attempts while waiting for a contended object
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Hash-addressed object store over a root directory
///
/// All operations are synchronous; a call may block (bounded by
/// `lock_timeout`) while another reader or writer holds the lock on the same
/// hash. Operations on different hashes never contend.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl ContentStore {
    /// Create a store handle over the given root directory
    ///
    /// The directory itself is created lazily on the first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ContentStore {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the lock-wait timeout for all subsequent operations
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object file for a hash (with sharding)
    pub fn object_path(&self, hash: &ObjectHash) -> PathBuf {
        self.root.join(hash.prefix()).join(hash.as_str())
    }

    /// Check whether an object exists
    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.object_path(hash).exists()
    }

    /// Copy a file's content into the store, addressed by its own hash
    ///
    /// Saving content that is already present rewrites the same bytes under
    /// the same exclusive lock, so the operation is idempotent. A failure
    /// mid-copy removes the partial object before returning.
    pub fn save_file(&self, source: &Path) -> Result<Blob> {
        let hash = hashing::hash_file(source)?;
        let mut dest = self.open_for_saving(&hash)?;

        let mut reader = File::open(source).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StratumError::FileNotFound(source.to_path_buf())
            } else {
                StratumError::Io(e)
            }
        })?;

        if let Err(e) = io::copy(&mut reader, &mut dest) {
            let path = dest.path().to_path_buf();
            drop(dest);
            fs::remove_file(&path).ok();
            return Err(e.into());
        }

        debug!("saved object {}", hash.short());
        Ok(Blob { hash })
    }

    /// Open the object file for writing under an exclusive lock
    ///
    /// Creates the shard directory if needed and truncates any existing
    /// content; used by object I/O to write canonical encodings directly.
    /// Truncation happens only after the lock is held, so a concurrent
    /// reader never observes a half-truncated object.
    pub fn open_for_saving(&self, hash: &ObjectHash) -> Result<LockedFile> {
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        let handle = self.open_for_saving_with(hash, &options)?;
        handle.file.set_len(0)?;
        Ok(handle)
    }

    /// Open the object file for writing with caller-supplied open options
    ///
    /// The exclusive lock is taken regardless of the options.
    pub fn open_for_saving_with(
        &self,
        hash: &ObjectHash,
        options: &OpenOptions,
    ) -> Result<LockedFile> {
        let path = self.object_path(hash);
        let shard = path.parent().expect("object path always has a shard parent");
        fs::create_dir_all(shard)?;

        let file = options.open(&path)?;
        self.lock_with_timeout(&file, &path, LockMode::Exclusive)?;
        Ok(LockedFile { file, path })
    }

    /// Open the object file for reading under a shared lock
    ///
    /// Fails with [`StratumError::ObjectNotFound`] if the object is absent.
    pub fn open_for_reading(&self, hash: &ObjectHash) -> Result<LockedFile> {
        let path = self.object_path(hash);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StratumError::ObjectNotFound(hash.to_string())
            } else {
                StratumError::Io(e)
            }
        })?;
        self.lock_with_timeout(&file, &path, LockMode::Shared)?;
        Ok(LockedFile { file, path })
    }

    /// Remove an object if present; removing an absent object succeeds
    ///
    /// Probes the object's lock (bounded by the store timeout) before
    /// unlinking so an in-progress reader or writer is not pulled out from
    /// under its handle.
    pub fn delete(&self, hash: &ObjectHash) -> Result<()> {
        let path = self.object_path(hash);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.lock_with_timeout(&file, &path, LockMode::Shared)?;
        FileExt::unlock(&file).ok();
        drop(file);

        fs::remove_file(&path)?;
        if let Some(shard) = path.parent() {
            fs::remove_dir(shard).ok();
        }
        debug!("deleted object {}", hash.short());
        Ok(())
    }

    fn lock_with_timeout(&self, file: &File, path: &Path, mode: LockMode) -> Result<()> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            // Fully qualified: std 1.89 grew inherent locking methods on
            // `File` that would otherwise shadow the fs2 trait.
            let attempt = match mode {
                LockMode::Exclusive => FileExt::try_lock_exclusive(file),
                LockMode::Shared => FileExt::try_lock_shared(file),
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if is_lock_contention(&e) => {
                    if Instant::now() >= deadline {
                        return Err(StratumError::LockTimeout {
                            path: path.to_path_buf(),
                        });
                    }
                    trace!("waiting for lock on {:?}", path);
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Exclusive,
    Shared,
}

fn is_lock_contention(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// An open object file holding an advisory lock
///
/// Passes `Read`/`Write`/`Seek` through to the underlying file and releases
/// the lock on drop.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    /// Path of the locked object file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole object into memory
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        Read::read_to_end(&mut self.file, &mut buf)?;
        Ok(buf)
    }
}

impl Read for LockedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LockedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        FileExt::unlock(&self.file).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ContentStore {
        ContentStore::new(dir.path().join("objects"))
    }

    fn write_source(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_save_uses_sharded_layout() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let source = write_source(&dir, "file.txt", "shard me");

        let blob = store.save_file(&source).unwrap();
        let expected = dir
            .path()
            .join("objects")
            .join(blob.hash.prefix())
            .join(blob.hash.as_str());

        assert_eq!(store.object_path(&blob.hash), expected);
        assert!(expected.exists());
        assert_eq!(fs::read_to_string(expected).unwrap(), "shard me");
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let source = write_source(&dir, "file.txt", "same bytes");

        let first = store.save_file(&source).unwrap();
        let second = store.save_file(&source).unwrap();
        assert_eq!(first.hash, second.hash);

        let shard = dir.path().join("objects").join(first.hash.prefix());
        assert_eq!(fs::read_dir(shard).unwrap().count(), 1);
    }

    #[test]
    fn test_save_missing_source() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store.save_file(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, StratumError::FileNotFound(_)));
    }

    #[test]
    fn test_open_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = hashing::hash_bytes(b"never stored");

        let err = store.open_for_reading(&hash).unwrap_err();
        assert!(matches!(err, StratumError::ObjectNotFound(_)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let source = write_source(&dir, "file.txt", "to delete");

        let blob = store.save_file(&source).unwrap();
        assert!(store.contains(&blob.hash));

        store.delete(&blob.hash).unwrap();
        assert!(!store.contains(&blob.hash));

        // Deleting again is silently fine
        store.delete(&blob.hash).unwrap();
    }

    #[test]
    fn test_delete_prunes_empty_shard() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let source = write_source(&dir, "file.txt", "lonely");

        let blob = store.save_file(&source).unwrap();
        let shard = dir.path().join("objects").join(blob.hash.prefix());
        assert!(shard.exists());

        store.delete(&blob.hash).unwrap();
        assert!(!shard.exists());
    }

    #[test]
    fn test_writer_blocks_reader_until_timeout() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).with_lock_timeout(Duration::from_millis(100));
        let source = write_source(&dir, "file.txt", "contended");

        let blob = store.save_file(&source).unwrap();
        let _writer = store.open_for_saving(&blob.hash).unwrap();

        let err = store.open_for_reading(&blob.hash).unwrap_err();
        assert!(matches!(err, StratumError::LockTimeout { .. }));
    }

    #[test]
    fn test_different_hashes_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).with_lock_timeout(Duration::from_millis(100));
        let source_a = write_source(&dir, "a.txt", "content a");
        let source_b = write_source(&dir, "b.txt", "content b");

        let blob_a = store.save_file(&source_a).unwrap();
        let _writer = store.open_for_saving(&blob_a.hash).unwrap();

        // An unrelated object is not affected by the held lock
        let blob_b = store.save_file(&source_b).unwrap();
        let mut reader = store.open_for_reading(&blob_b.hash).unwrap();
        assert_eq!(reader.read_to_end().unwrap(), b"content b");
    }

    #[test]
    fn test_read_back_through_locked_handle() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let source = write_source(&dir, "file.txt", "round trip");

        let blob = store.save_file(&source).unwrap();
        let mut handle = store.open_for_reading(&blob.hash).unwrap();
        assert_eq!(handle.read_to_end().unwrap(), b"round trip");
    }
}
