//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by backends and the journal.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Truncation target lies past the current end.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncatePastEnd {
        /// Requested new size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// A journal frame failed validation before the tail.
    #[error("journal corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Offset of the offending frame.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A payload exceeds the maximum frame size.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Payload length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// A batch with no frames.
    #[error("journal batch holds no frames")]
    EmptyBatch,

    /// A failed append could not be rolled back; reopen the journal.
    #[error("journal poisoned by an append that could not be rolled back")]
    Poisoned,

    /// Another process holds the journal file.
    #[error("journal locked by another process: {}", path.display())]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
