//! The persistence collaborator contract.
//!
//! The store never talks to storage directly. It opens a [`WriteScope`],
//! performs its check-then-write inside it and commits. An implementation
//! must make that sequence atomic against other writers of the same key,
//! either by holding an exclusive lock for the scope's lifetime or by
//! conditioning the write on the revision read.

mod memory;

pub use memory::{MemoryPersistence, MemoryScope};

use crate::audit::AuditLedgerEntry;
use crate::entity::{Entity, Record};
use crate::error::StoreError;
use crate::key::{AuditKey, CompositeKey};
use crate::types::Revision;

/// A write transaction against a persistence collaborator.
///
/// Dropping a scope without committing discards every pending change.
pub trait WriteScope<R: Record> {
    /// Reads the live entity at `key` with its stored revision, seeing this
    /// scope's own pending writes.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn read_for_update(
        &mut self,
        key: &CompositeKey,
    ) -> Result<Option<(Entity<R>, Revision)>, StoreError>;

    /// Live entities matching an index key, seeing pending writes, ordered by
    /// primary key.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn read_by_index(&mut self, key: &CompositeKey) -> Result<Vec<Entity<R>>, StoreError>;

    /// Stages a live entity.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the write cannot be staged.
    fn write(&mut self, entity: Entity<R>) -> Result<(), StoreError>;

    /// Stages removal of the live entity at `key`.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the removal cannot be staged.
    fn remove(&mut self, key: &CompositeKey) -> Result<(), StoreError>;

    /// Stages a ledger entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::LedgerCollision`] if the audit key is already present
    /// (committed or pending).
    fn append_ledger(&mut self, entry: AuditLedgerEntry<R>) -> Result<(), StoreError>;

    /// Makes every staged change durable and visible, all together.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the commit fails. Nothing becomes visible then,
    /// in this process or after a restart.
    fn commit(self) -> Result<(), StoreError>;

    /// Discards every staged change.
    fn abort(self);
}

/// Storage for one entity family: live rows, index lookups and the ledger.
pub trait PersistenceCollaborator<R: Record>: Send + Sync {
    /// Write scope type.
    type Scope<'a>: WriteScope<R>
    where
        Self: 'a;

    /// Opens a write scope. Blocks while another scope is open.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the store is unavailable.
    fn begin_write(&self) -> Result<Self::Scope<'_>, StoreError>;

    /// Reads the committed live entity at `key`.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn read(&self, key: &CompositeKey) -> Result<Option<Entity<R>>, StoreError>;

    /// Committed live entities matching an index key, ordered by primary key.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn read_by_index(&self, key: &CompositeKey) -> Result<Vec<Entity<R>>, StoreError>;

    /// Ledger entries for one primary key, in audit key order.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn ledger_for_key(&self, key: &CompositeKey) -> Result<Vec<AuditLedgerEntry<R>>, StoreError>;

    /// The whole ledger, in audit key order.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn ledger(&self) -> Result<Vec<AuditLedgerEntry<R>>, StoreError>;

    /// One ledger entry by audit key.
    ///
    /// # Errors
    ///
    /// A [`StoreError`] if the read fails.
    fn read_history(&self, key: &AuditKey) -> Result<Option<AuditLedgerEntry<R>>, StoreError>;
}
