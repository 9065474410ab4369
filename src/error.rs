//! Error types for the stratum library
//!
//! This module defines all error types that can occur during stratum
//! operations. Every recoverable condition is surfaced to the caller as a
//! typed variant; the library never prints or exits on its own.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the stratum library
pub type Result<T> = std::result::Result<T, StratumError>;

/// Main error type for all stratum operations
#[derive(Debug, Error)]
pub enum StratumError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A source file that should be hashed or stored does not exist
    #[error("file not found: {0:?}")]
    FileNotFound(PathBuf),

    /// Object not found in content-addressable storage
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Branch does not exist in the refs directory
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Attempt to delete the sole remaining branch
    #[error("cannot delete branch '{0}': it is the last remaining branch")]
    LastBranch(String),

    /// Repository already exists at the given path
    #[error("repository already exists at {0:?}")]
    RepositoryExists(PathBuf),

    /// Repository-requiring operation invoked before init
    #[error("repository not initialized at {0:?}")]
    NotInitialized(PathBuf),

    /// Invalid argument supplied by the caller
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lock could not be acquired within the deadline
    #[error("lock acquisition timed out for {path:?}")]
    LockTimeout {
        /// Path of the object file whose lock was contended
        path: PathBuf,
    },

    /// Stored bytes do not decode as a valid Tree or Commit
    #[error("corrupt object {hash}: {reason}")]
    CorruptObject {
        /// Hash of the object that failed to decode
        hash: String,
        /// What went wrong during decoding
        reason: String,
    },

    /// A string is not a valid 40-character lowercase hex hash
    #[error("invalid object hash: {0}")]
    InvalidHash(String),

    /// A file name could not be represented as UTF-8
    #[error("path is not valid UTF-8: {0:?}")]
    PathConversion(std::ffi::OsString),
}

impl StratumError {
    /// Create an `InvalidArgument` error with a custom message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        StratumError::InvalidArgument(msg.into())
    }

    /// Create a `CorruptObject` error for the given hash
    pub fn corrupt(hash: impl Into<String>, reason: impl Into<String>) -> Self {
        StratumError::CorruptObject {
            hash: hash.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error means "the thing does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StratumError::FileNotFound(_)
                | StratumError::ObjectNotFound(_)
                | StratumError::BranchNotFound(_)
        )
    }

    /// Check if this error indicates a corrupted object store
    pub fn is_corruption(&self) -> bool {
        matches!(self, StratumError::CorruptObject { .. })
    }

    /// Check if this error is transient and worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StratumError::LockTimeout { .. })
    }
}
