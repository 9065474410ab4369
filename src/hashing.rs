//! Hashing and canonical object encodings
//!
//! This module is the root of object identity: it computes SHA-1 content
//! hashes over raw bytes and files, and defines the canonical binary
//! encoding of [`Tree`] and [`Commit`] objects. The encoding serves double
//! duty — it is both the byte sequence that gets hashed and the format the
//! object store persists (see [`crate::object_io`]), so structurally equal
//! objects are always byte-identical on disk and hash-identical everywhere.
//!
//! ## Encoding format
//!
//! All strings are length-prefixed with a `u32` little-endian byte count, so
//! arbitrary entry names can never be confused with field delimiters.
//!
//! ```text
//! Tree:    u32 record_count
//!          repeat (sorted by name): u8 kind_tag | str hash | str name
//! Commit:  str tree_hash | str author | str message
//!          i64 timestamp (unix seconds, little-endian)
//!          str parent      -- zero-length string encodes "no parent"
//! ```
//!
//! A real parent is always 40 bytes, so the zero-length null sentinel can
//! never collide with one.

use crate::error::{Result, StratumError};
use crate::types::{Commit, ObjectHash, RecordKind, Tree, TreeRecord, HASH_LEN};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Upper bound on any length prefix; larger values mean a corrupt object
const MAX_FIELD_LEN: u32 = 1 << 20;

/// Compute the SHA-1 hash of raw bytes
pub fn hash_bytes(content: &[u8]) -> ObjectHash {
    let mut hasher = Sha1::new();
    hasher.update(content);
    ObjectHash::from_digest(&hasher.finalize())
}

/// Hash a file's content with buffered streaming reads
///
/// A missing file maps to [`StratumError::FileNotFound`] so callers can tell
/// "no such file" apart from other I/O failures.
pub fn hash_file(path: &Path) -> Result<ObjectHash> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StratumError::FileNotFound(path.to_path_buf())
        } else {
            StratumError::Io(e)
        }
    })?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(ObjectHash::from_digest(&hasher.finalize()))
}

/// Hash a tree via its canonical encoding
pub fn hash_tree(tree: &Tree) -> ObjectHash {
    hash_bytes(&encode_tree(tree))
}

/// Hash a commit via its canonical encoding
pub fn hash_commit(commit: &Commit) -> ObjectHash {
    hash_bytes(&encode_commit(commit))
}

/// Produce the canonical byte encoding of a tree
pub fn encode_tree(tree: &Tree) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(tree.len() as u32).to_le_bytes());
    for record in tree.records() {
        buf.push(record.kind.tag());
        write_str(&mut buf, record.hash.as_str());
        write_str(&mut buf, &record.name);
    }
    buf
}

/// Produce the canonical byte encoding of a commit
pub fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut buf = Vec::new();
    write_str(&mut buf, commit.tree_hash.as_str());
    write_str(&mut buf, &commit.author);
    write_str(&mut buf, &commit.message);
    buf.extend_from_slice(&commit.timestamp.to_le_bytes());
    match &commit.parent {
        Some(parent) => write_str(&mut buf, parent.as_str()),
        None => write_str(&mut buf, ""),
    }
    buf
}

/// Decode a tree from its canonical encoding
///
/// `hash` identifies the object in [`StratumError::CorruptObject`] errors.
pub fn decode_tree(bytes: &[u8], hash: &ObjectHash) -> Result<Tree> {
    let mut reader = ByteReader::new(bytes, hash);
    let count = reader.read_u32()?;
    if count > MAX_FIELD_LEN {
        return Err(reader.corrupt("record count exceeds maximum"));
    }

    let mut tree = Tree::new();
    for _ in 0..count {
        let tag = reader.read_u8()?;
        let kind = RecordKind::from_tag(tag)
            .ok_or_else(|| reader.corrupt(format!("unknown record kind tag {tag}")))?;
        let record_hash = reader.read_hash()?;
        let name = reader.read_string()?;
        if tree.get(&name).is_some() {
            return Err(reader.corrupt(format!("duplicate record name {name:?}")));
        }
        tree.insert(TreeRecord::new(kind, record_hash, name));
    }
    reader.finish()?;
    Ok(tree)
}

/// Decode a commit from its canonical encoding
pub fn decode_commit(bytes: &[u8], hash: &ObjectHash) -> Result<Commit> {
    let mut reader = ByteReader::new(bytes, hash);
    let tree_hash = reader.read_hash()?;
    let author = reader.read_string()?;
    let message = reader.read_string()?;
    let timestamp = reader.read_i64()?;
    let parent_str = reader.read_string()?;
    reader.finish()?;

    let parent = if parent_str.is_empty() {
        None
    } else {
        Some(
            ObjectHash::from_str(&parent_str)
                .map_err(|_| reader.corrupt(format!("invalid parent hash {parent_str:?}")))?,
        )
    };
    Ok(Commit::new(tree_hash, author, message, timestamp, parent))
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Bounds-checked cursor over an object's bytes
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    hash: &'a ObjectHash,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8], hash: &'a ObjectHash) -> Self {
        ByteReader { buf, pos: 0, hash }
    }

    fn corrupt(&self, reason: impl Into<String>) -> StratumError {
        StratumError::corrupt(self.hash.as_str(), reason)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| self.corrupt("unexpected end of object"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        if len > MAX_FIELD_LEN {
            return Err(self.corrupt("string length exceeds maximum"));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.corrupt("string is not valid UTF-8"))
    }

    fn read_hash(&mut self) -> Result<ObjectHash> {
        let s = self.read_string()?;
        ObjectHash::from_str(&s).map_err(|_| self.corrupt(format!("invalid hash field {s:?}")))
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(self.corrupt("trailing bytes after object"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(byte: u8) -> ObjectHash {
        hash_bytes(&[byte])
    }

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        tree.insert(TreeRecord::new(RecordKind::Blob, hash_of(1), "a.txt"));
        tree.insert(TreeRecord::new(RecordKind::Tree, hash_of(2), "sub"));
        tree
    }

    #[test]
    fn test_hash_bytes_known_value() {
        // SHA-1 of the empty input
        assert_eq!(
            hash_bytes(b"").as_str(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        // SHA-1 of "test"
        assert_eq!(
            hash_bytes(b"test").as_str(),
            "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
    }

    #[test]
    fn test_hash_bytes_deterministic() {
        let data = b"some content";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"file content").unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"file content"));
    }

    #[test]
    fn test_hash_file_not_found() {
        let err = hash_file(Path::new("definitely/not/a/file")).unwrap_err();
        assert!(matches!(err, StratumError::FileNotFound(_)));
    }

    #[test]
    fn test_tree_roundtrip() {
        let tree = sample_tree();
        let encoded = encode_tree(&tree);
        let decoded = decode_tree(&encoded, &tree.hash()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_empty_tree_roundtrip() {
        let tree = Tree::new();
        let decoded = decode_tree(&encode_tree(&tree), &tree.hash()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_commit_roundtrip_with_and_without_parent() {
        let root = Commit::new(hash_of(1), "Author", "first", 1234567890, None);
        let decoded = decode_commit(&encode_commit(&root), &root.hash()).unwrap();
        assert_eq!(decoded, root);
        assert!(decoded.parent.is_none());

        let child = Commit::new(
            hash_of(1),
            "Author",
            "second",
            1234567891,
            Some(root.hash()),
        );
        let decoded = decode_commit(&encode_commit(&child), &child.hash()).unwrap();
        assert_eq!(decoded, child);
        assert_eq!(decoded.parent, Some(root.hash()));
    }

    #[test]
    fn test_null_parent_hashes_distinctly() {
        let without = Commit::new(hash_of(1), "Author", "msg", 0, None);
        let with = Commit::new(hash_of(1), "Author", "msg", 0, Some(hash_of(2)));
        assert_ne!(without.hash(), with.hash());
    }

    #[test]
    fn test_tree_hash_ignores_insertion_order() {
        let mut forward = Tree::new();
        forward.insert(TreeRecord::new(RecordKind::Blob, hash_of(1), "a"));
        forward.insert(TreeRecord::new(RecordKind::Blob, hash_of(2), "b"));

        let mut reversed = Tree::new();
        reversed.insert(TreeRecord::new(RecordKind::Blob, hash_of(2), "b"));
        reversed.insert(TreeRecord::new(RecordKind::Blob, hash_of(1), "a"));

        assert_eq!(encode_tree(&forward), encode_tree(&reversed));
        assert_eq!(forward.hash(), reversed.hash());
    }

    #[test]
    fn test_decode_truncated_tree() {
        let tree = sample_tree();
        let encoded = encode_tree(&tree);
        let err = decode_tree(&encoded[..encoded.len() - 3], &tree.hash()).unwrap_err();
        assert!(matches!(err, StratumError::CorruptObject { .. }));
    }

    #[test]
    fn test_decode_trailing_garbage() {
        let tree = sample_tree();
        let mut encoded = encode_tree(&tree);
        encoded.push(0xff);
        let err = decode_tree(&encoded, &tree.hash()).unwrap_err();
        assert!(matches!(err, StratumError::CorruptObject { .. }));
    }

    #[test]
    fn test_decode_bad_kind_tag() {
        let mut tree = Tree::new();
        tree.insert(TreeRecord::new(RecordKind::Blob, hash_of(1), "f"));
        let mut encoded = encode_tree(&tree);
        encoded[4] = 9; // first record's kind tag
        let err = decode_tree(&encoded, &tree.hash()).unwrap_err();
        assert!(matches!(err, StratumError::CorruptObject { .. }));
    }

    #[test]
    fn test_decode_commit_garbage() {
        let hash = hash_of(0);
        let err = decode_commit(b"\xde\xad\xbe\xef", &hash).unwrap_err();
        assert!(matches!(err, StratumError::CorruptObject { .. }));
    }
}
