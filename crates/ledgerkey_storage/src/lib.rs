//! # ledgerkey storage
//!
//! Byte-level persistence for the ledgerkey audit ledger.
//!
//! Backends are **opaque byte stores**: they append, read back and truncate
//! bytes and know nothing about entities, keys or revisions. On top of them,
//! [`Journal`] frames opaque payloads with a magic, a length and a CRC-32 and
//! seals each batch with a commit marker, so a ledger can be replayed after a
//! restart without the half of a batch a crash cut off.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and ephemeral stores
//! - [`FileBackend`] - a single file, exclusively locked while open
//!
//! ## Example
//!
//! ```rust
//! use ledgerkey_storage::{InMemoryBackend, Journal};
//!
//! let mut journal = Journal::new(Box::new(InMemoryBackend::new()), true);
//! journal.append(b"first").unwrap();
//! journal.append(b"second").unwrap();
//!
//! let frames = journal.recover().unwrap();
//! assert_eq!(frames.len(), 2);
//! assert_eq!(frames[1].payload, b"second");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod journal;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use journal::{
    encode_commit, encode_frame, Journal, JournalFrame, JournalScan, COMMIT_MAGIC,
    COMMIT_MARKER_SIZE, FRAME_CRC_SIZE, FRAME_HEADER_SIZE, FRAME_MAGIC, MAX_FRAME_PAYLOAD,
};
pub use memory::InMemoryBackend;
