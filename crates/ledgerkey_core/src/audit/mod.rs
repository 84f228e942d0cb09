//! The append-only audit ledger.
//!
//! Every create, update and delete produces exactly one
//! [`AuditLedgerEntry`]: a full snapshot keyed by an
//! [`AuditKey`](crate::AuditKey). Entries are never mutated or removed.

pub mod codec;
mod entry;
pub mod verify;

pub use codec::{decode_entry, decode_raw, encode_entry, EncodedEntry, EncodedField};
pub use entry::{AuditLedgerEntry, HistoryEntity};
pub use verify::{verify_entries, verify_ledger, LedgerIssue, VerifyReport};
