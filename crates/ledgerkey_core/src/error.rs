//! Error types for ledgerkey core.
//!
//! Errors are split by concern. The mutation entry points each return their
//! own error type ([`CreateError`], [`UpdateError`], [`DeleteError`],
//! [`ReadError`]) so a [`ConcurrencyConflict`] is never confused with a
//! missing entity or a fatal invariant violation.

use crate::field::{FieldId, ScalarValue};
use crate::types::{AuditAction, Revision};
use thiserror::Error;

/// A field value violated its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Null in a non-nullable field.
    #[error("field `{field}` must not be null")]
    NullValue {
        /// Field name.
        field: &'static str,
    },

    /// Bound or length violation.
    #[error("field `{field}` out of range: {reason}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// What was violated.
        reason: String,
    },

    /// Value of the wrong kind for the field.
    #[error("field `{field}` expects {expected}, got {found}")]
    KindMismatch {
        /// Field name.
        field: &'static str,
        /// Declared kind.
        expected: String,
        /// Kind supplied.
        found: String,
    },

    /// The family declares no such field.
    #[error("family `{family}` has no field {field}")]
    UnknownField {
        /// Family tag.
        family: &'static str,
        /// Requested field.
        field: FieldId,
    },
}

impl FieldError {
    /// Creates an out-of-range error.
    pub fn out_of_range(field: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            field,
            reason: reason.into(),
        }
    }
}

/// A reference could not be dereferenced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No owner with that id.
    #[error("no {target} with id {id}")]
    NotFound {
        /// Target family tag.
        target: String,
        /// Rendered id.
        id: String,
    },
}

impl ResolutionError {
    /// Creates a not-found error.
    pub fn not_found(target: &str, id: &ScalarValue) -> Self {
        Self::NotFound {
            target: target.to_string(),
            id: id.to_string(),
        }
    }
}

/// A key could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A component failed validation.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Wrong number of components.
    #[error("{family} {shape} takes {expected} components, got {found}")]
    Arity {
        /// Family tag.
        family: &'static str,
        /// Shape name.
        shape: String,
        /// Declared arity.
        expected: usize,
        /// Supplied arity.
        found: usize,
    },

    /// The family declares no such index.
    #[error("family `{family}` has no index `{name}`")]
    UnknownIndex {
        /// Family tag.
        family: &'static str,
        /// Requested index.
        name: String,
    },

    /// A reference component could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The key belongs to another family or shape than the operation takes.
    #[error("expected a {expected} key, got {found}")]
    ShapeMismatch {
        /// What the operation takes.
        expected: String,
        /// What was supplied.
        found: String,
    },
}

/// Two shapes could not be compared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    /// The shapes belong to different families, or neither field set
    /// relates to the other.
    #[error("unsupported comparison between {left} and {right}")]
    UnsupportedComparison {
        /// Left shape.
        left: String,
        /// Right shape.
        right: String,
    },

    /// A compared reference has no owner handle.
    #[error("reference field {field} of {family} is unresolved")]
    UnresolvedReference {
        /// Family tag.
        family: &'static str,
        /// Field id.
        field: FieldId,
    },
}

/// The expected revision did not match the stored one.
///
/// Recoverable: re-read the entity and retry with its current revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("concurrency conflict: expected {expected}, stored {stored}")]
pub struct ConcurrencyConflict {
    /// Revision the caller expected.
    pub expected: Revision,
    /// Revision actually stored.
    pub stored: Revision,
}

/// A condition that must never happen. Aborts the enclosing write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// An audit key was already present in the ledger.
    #[error("audit ledger collision on {key}")]
    LedgerCollision {
        /// Rendered audit key.
        key: String,
    },

    /// The revision counter cannot advance.
    #[error("revision overflow after {revision}")]
    RevisionOverflow {
        /// Last revision.
        revision: Revision,
    },

    /// Before/after snapshots do not describe a valid transition.
    #[error("invalid {action} transition: {reason}")]
    InvalidTransition {
        /// Recorded action.
        action: AuditAction,
        /// What was wrong.
        reason: String,
    },
}

/// Ledger entry encoding or decoding failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode failed: {message}")]
    Encode {
        /// Description.
        message: String,
    },

    /// Deserialization failed.
    #[error("decode failed: {message}")]
    Decode {
        /// Description.
        message: String,
    },

    /// The entry does not fit the family it is decoded into.
    #[error("entry does not match family `{family}`: {reason}")]
    Schema {
        /// Target family.
        family: &'static str,
        /// What did not match.
        reason: String,
    },
}

/// The persistence collaborator failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store failed or timed out.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Description.
        reason: String,
    },

    /// The audit key is already in the ledger.
    #[error("audit key already in ledger: {key}")]
    LedgerCollision {
        /// Rendered audit key.
        key: String,
    },

    /// Byte storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] ledgerkey_storage::StorageError),

    /// A ledger entry could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A key of a stored entity could not be built.
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Maps a store failure: collisions are invariant violations, everything
/// else passes through as unavailability.
macro_rules! from_store_error {
    ($ty:ident) => {
        impl From<StoreError> for $ty {
            fn from(err: StoreError) -> Self {
                match err {
                    StoreError::LedgerCollision { key } => {
                        Self::Invariant(InvariantViolation::LedgerCollision { key })
                    }
                    other => Self::StoreUnavailable(other),
                }
            }
        }
    };
}

/// Input preparation failures shared by create and update.
#[derive(Debug, Error)]
pub(crate) enum PrepareError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Key(KeyError),
}

impl From<KeyError> for PrepareError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Field(e) => Self::Field(e),
            KeyError::Resolution(e) => Self::Resolution(e),
            other => Self::Key(other),
        }
    }
}

/// Error from [`VersionedEntityStore::create`](crate::VersionedEntityStore::create).
#[derive(Debug, Error)]
pub enum CreateError {
    /// A non-nullable field was null.
    #[error("missing required field `{field}`")]
    MissingRequiredField {
        /// Field name.
        field: &'static str,
    },

    /// A field failed validation.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// A reference could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A key could not be built.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A unique index already holds another entity.
    #[error("unique index `{index}` already holds {key}")]
    UniqueViolation {
        /// Index name.
        index: &'static str,
        /// Rendered index key.
        key: String,
    },

    /// Fatal invariant violation.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// The persistence collaborator failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl CreateError {
    /// Whether this is an invariant violation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Whether retrying may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

from_store_error!(CreateError);

impl From<PrepareError> for CreateError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::Missing(field) => Self::MissingRequiredField { field },
            PrepareError::Field(e) => Self::Field(e),
            PrepareError::Resolution(e) => Self::Resolution(e),
            PrepareError::Key(e) => Self::Key(e),
        }
    }
}

/// Error from [`VersionedEntityStore::update`](crate::VersionedEntityStore::update).
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No live entity at the primary key.
    #[error("no entity at {key}")]
    NotFound {
        /// Rendered primary key.
        key: String,
    },

    /// The expected revision is stale.
    #[error(transparent)]
    ConcurrencyConflict(#[from] ConcurrencyConflict),

    /// A non-nullable field was null.
    #[error("missing required field `{field}`")]
    MissingRequiredField {
        /// Field name.
        field: &'static str,
    },

    /// A field failed validation.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// A reference could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A key could not be built.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A unique index already holds another entity.
    #[error("unique index `{index}` already holds {key}")]
    UniqueViolation {
        /// Index name.
        index: &'static str,
        /// Rendered index key.
        key: String,
    },

    /// Fatal invariant violation.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// The persistence collaborator failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl UpdateError {
    /// Whether this is an invariant violation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Whether re-reading and retrying may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_) | Self::StoreUnavailable(_))
    }
}

from_store_error!(UpdateError);

impl From<PrepareError> for UpdateError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::Missing(field) => Self::MissingRequiredField { field },
            PrepareError::Field(e) => Self::Field(e),
            PrepareError::Resolution(e) => Self::Resolution(e),
            PrepareError::Key(e) => Self::Key(e),
        }
    }
}

/// Error from the delete entry points.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// No live entity at the key (guarded delete only).
    #[error("no entity at {key}")]
    NotFound {
        /// Rendered primary key.
        key: String,
    },

    /// The expected revision is stale (guarded delete only).
    #[error(transparent)]
    ConcurrencyConflict(#[from] ConcurrencyConflict),

    /// A reference in the key could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The key does not fit the family.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Fatal invariant violation.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// The persistence collaborator failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl DeleteError {
    /// Whether this is an invariant violation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Whether re-reading and retrying may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_) | Self::StoreUnavailable(_))
    }
}

from_store_error!(DeleteError);

/// Error from the read entry points.
#[derive(Debug, Error)]
pub enum ReadError {
    /// A reference in the key could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The key does not fit the family.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The persistence collaborator failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ReadError {
    /// Whether retrying may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Error from a multi-step [`write_transaction`](crate::VersionedEntityStore::write_transaction).
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A create failed.
    #[error(transparent)]
    Create(#[from] CreateError),

    /// An update failed.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// A delete failed.
    #[error(transparent)]
    Delete(#[from] DeleteError),

    /// A read failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Beginning or committing the write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransactionError {
    /// Whether the failure is an invariant violation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Create(e) => e.is_fatal(),
            Self::Update(e) => e.is_fatal(),
            Self::Delete(e) => e.is_fatal(),
            Self::Read(_) => false,
            Self::Store(e) => matches!(e, StoreError::LedgerCollision { .. }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_maps_to_invariant() {
        let err = UpdateError::from(StoreError::LedgerCollision { key: "k".into() });
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn unavailability_is_retryable() {
        let err = CreateError::from(StoreError::unavailable("timeout"));
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn conflict_is_distinct_from_not_found() {
        let conflict = UpdateError::from(ConcurrencyConflict {
            expected: Revision::new(1),
            stored: Revision::new(2),
        });
        let missing = UpdateError::NotFound { key: "k".into() };
        assert!(conflict.is_retryable());
        assert!(!missing.is_retryable());
        assert_eq!(
            conflict.to_string(),
            "concurrency conflict: expected rev:1, stored rev:2"
        );
    }

    #[test]
    fn prepare_errors_keep_their_meaning() {
        let err = CreateError::from(PrepareError::Missing("host_name"));
        assert!(matches!(
            err,
            CreateError::MissingRequiredField { field: "host_name" }
        ));
    }
}
