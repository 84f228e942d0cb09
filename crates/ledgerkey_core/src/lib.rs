//! # LedgerKey Core
//!
//! Identity, versioning and audit for persistent entities.
//!
//! This crate provides:
//! - Composite keys built from scalar and reference fields
//! - An equivalence protocol comparing entities, history entries and keys
//! - Optimistic concurrency through per-entity revisions
//! - An append-only audit ledger with one entry per mutation
//! - A versioned entity store over a pluggable persistence collaborator
//!
//! ## Example
//!
//! ```rust
//! use ledgerkey_core::{
//!     FieldError, FieldId, FieldSpec, FieldValue, MapResolver, MemoryStore, Record, Revision,
//!     Schema, StoreConfig,
//! };
//! use std::sync::Arc;
//!
//! static FIELDS: [FieldSpec; 2] = [
//!     FieldSpec::text(0, "name", 64).key(),
//!     FieldSpec::text(1, "description", 50).mutable().nullable(),
//! ];
//! static CLUSTER: Schema = Schema::new("Cluster", &FIELDS, &[FieldId(0)]);
//!
//! #[derive(Debug, Clone, Default)]
//! struct Cluster {
//!     name: Option<String>,
//!     description: Option<String>,
//! }
//!
//! impl Record for Cluster {
//!     fn schema() -> &'static Schema {
//!         &CLUSTER
//!     }
//!
//!     fn blank() -> Self {
//!         Self::default()
//!     }
//!
//!     fn field(&self, id: FieldId) -> FieldValue {
//!         match id.0 {
//!             0 => FieldValue::scalar_or_null(self.name.clone()),
//!             1 => FieldValue::scalar_or_null(self.description.clone()),
//!             _ => FieldValue::Null,
//!         }
//!     }
//!
//!     fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
//!         match id.0 {
//!             0 => self.name = value.into_text("name")?,
//!             1 => self.description = value.into_text("description")?,
//!             _ => return Err(FieldError::UnknownField { family: "Cluster", field: id }),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let cluster = |description: Option<&str>| Cluster {
//!     name: Some("clusterA".to_string()),
//!     description: description.map(str::to_string),
//! };
//!
//! let store = MemoryStore::<Cluster>::in_memory(Arc::new(MapResolver::new()), StoreConfig::new());
//! let created = store.create(cluster(None)).unwrap();
//! assert_eq!(created.revision(), Revision::INITIAL);
//!
//! let updated = store.update(cluster(Some("east")), created.revision()).unwrap();
//! assert_eq!(updated.revision(), Revision::new(2));
//!
//! // The first revision is stale now.
//! assert!(store.update(cluster(Some("west")), Revision::INITIAL).is_err());
//! assert_eq!(store.list_history().unwrap().len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
mod clock;
mod config;
mod entity;
mod equivalence;
mod error;
mod field;
mod key;
mod persistence;
mod revision;
mod store;
mod types;

#[cfg(test)]
mod test_support;

pub use audit::{AuditLedgerEntry, HistoryEntity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{JournalOptions, StoreConfig};
pub use entity::{Entity, EntityOwner, Record};
pub use equivalence::{compare, equals, hash_fields, hash_shape, hash_shared, KeyShape, Shape};
pub use error::{
    CodecError, CompareError, ConcurrencyConflict, CreateError, DeleteError, FieldError,
    InvariantViolation, KeyError, ReadError, ResolutionError, StoreError, TransactionError,
    UpdateError,
};
pub use field::{
    FieldId, FieldKind, FieldRole, FieldSpec, FieldValue, KeyResolver, MapResolver, Owner,
    OwnerHandle, OwnerRecord, ReferenceKeyField, ScalarKind, ScalarValue,
};
pub use key::{AuditKey, CompositeKey, FieldRef, IndexSpec, Schema, ShapeKind};
pub use persistence::{MemoryPersistence, MemoryScope, PersistenceCollaborator, WriteScope};
pub use revision::RevisionGuard;
pub use store::{MemoryStore, VersionedEntityStore};
pub use types::{ActorId, AuditAction, ClusterId, Revision, SessionId, Timestamp};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
