//! Schema-independent ledger entry encoding.
//!
//! Entries are encoded as CBOR. References are written as their scalar id and
//! decode unresolved; resolve them on demand with
//! [`AuditLedgerEntry::resolve_references`].

use crate::audit::AuditLedgerEntry;
use crate::entity::{Entity, Record};
use crate::error::CodecError;
use crate::field::{FieldId, FieldKind, FieldValue, ReferenceKeyField, ScalarValue};
use crate::key::AuditKey;
use crate::types::{ActorId, AuditAction, ClusterId, Revision, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One field of an encoded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedField {
    /// Field id.
    pub id: u16,
    /// Field name, informational.
    pub name: String,
    /// Value; a reference is stored as its id.
    pub value: Option<ScalarValue>,
}

/// A ledger entry as stored in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEntry {
    /// Family tag.
    pub family: String,
    /// Audit cluster id.
    pub cluster: i64,
    /// Audit timestamp, microseconds.
    pub stamp: u64,
    /// Audit action code.
    pub action: i16,
    /// Snapshot revision.
    pub revision: u64,
    /// Audit session.
    pub session: Uuid,
    /// Primary key field ids in key order.
    pub primary_key: Vec<u16>,
    /// Every declared field in declaration order.
    pub fields: Vec<EncodedField>,
    /// Created-by attribution.
    pub created_by: Uuid,
    /// Created-at attribution, microseconds.
    pub created_at: u64,
    /// Updated-by attribution.
    pub updated_by: Uuid,
    /// Updated-at attribution, microseconds.
    pub updated_at: u64,
}

impl EncodedEntry {
    /// Captures a typed entry.
    #[must_use]
    pub fn from_entry<R: Record>(entry: &AuditLedgerEntry<R>) -> Self {
        let schema = R::schema();
        let key = entry.key();
        let snapshot = entry.snapshot();
        Self {
            family: schema.tag.to_string(),
            cluster: key.cluster.as_i64(),
            stamp: key.stamp.as_micros(),
            action: key.action.code(),
            revision: key.revision.as_u64(),
            session: *key.session.as_uuid(),
            primary_key: schema.primary_key.iter().map(|id| id.0).collect(),
            fields: schema
                .fields
                .iter()
                .map(|spec| EncodedField {
                    id: spec.id.0,
                    name: spec.name.to_string(),
                    value: snapshot.record().field(spec.id).scalar().cloned(),
                })
                .collect(),
            created_by: *snapshot.created_by().as_uuid(),
            created_at: snapshot.created_at().as_micros(),
            updated_by: *snapshot.updated_by().as_uuid(),
            updated_at: snapshot.updated_at().as_micros(),
        }
    }

    /// Rebuilds a typed entry.
    ///
    /// # Errors
    ///
    /// [`CodecError::Schema`] if the entry belongs to another family or its
    /// fields do not fit `R`'s declaration.
    pub fn into_entry<R: Record>(self) -> Result<AuditLedgerEntry<R>, CodecError> {
        let schema = R::schema();
        let mismatch = |reason: String| CodecError::Schema {
            family: schema.tag,
            reason,
        };
        if self.family != schema.tag {
            return Err(mismatch(format!("entry is for `{}`", self.family)));
        }
        let action = AuditAction::from_code(self.action)
            .ok_or_else(|| mismatch(format!("unknown action code {}", self.action)))?;

        let mut record = R::blank();
        for field in self.fields {
            let spec = schema
                .field(FieldId(field.id))
                .ok_or_else(|| mismatch(format!("unknown field {} `{}`", field.id, field.name)))?;
            let value = match (field.value, spec.kind) {
                (None, _) => FieldValue::Null,
                (Some(id), FieldKind::Reference { target, .. }) => {
                    FieldValue::Reference(ReferenceKeyField::unresolved(target, id))
                }
                (Some(scalar), FieldKind::Scalar(_)) => FieldValue::Scalar(scalar),
            };
            record
                .set_field(spec.id, value)
                .map_err(|e| mismatch(e.to_string()))?;
        }

        let snapshot = Entity::from_parts(
            record,
            Revision::new(self.revision),
            ActorId::from_uuid(self.created_by),
            Timestamp::from_micros(self.created_at),
            ActorId::from_uuid(self.updated_by),
            Timestamp::from_micros(self.updated_at),
        );
        let natural = snapshot
            .primary_key()
            .map_err(|e| mismatch(e.to_string()))?;
        let key = AuditKey {
            cluster: ClusterId::new(self.cluster),
            stamp: Timestamp::from_micros(self.stamp),
            action,
            revision: Revision::new(self.revision),
            session: SessionId::from_uuid(self.session),
            natural,
        };
        AuditLedgerEntry::from_parts(key, snapshot).map_err(|e| mismatch(e.to_string()))
    }

    /// The audit action, if the code is known.
    #[must_use]
    pub const fn audit_action(&self) -> Option<AuditAction> {
        AuditAction::from_code(self.action)
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&EncodedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key values in key order.
    #[must_use]
    pub fn natural_key(&self) -> Vec<Option<ScalarValue>> {
        self.primary_key
            .iter()
            .map(|id| {
                self.fields
                    .iter()
                    .find(|f| f.id == *id)
                    .and_then(|f| f.value.clone())
            })
            .collect()
    }

    /// The natural key rendered as `Family(a, b)`.
    #[must_use]
    pub fn natural_key_string(&self) -> String {
        let parts: Vec<String> = self
            .natural_key()
            .iter()
            .map(|v| v.as_ref().map_or_else(|| "null".to_string(), ToString::to_string))
            .collect();
        format!("{}({})", self.family, parts.join(", "))
    }
}

/// Encodes an entry as CBOR.
///
/// # Errors
///
/// [`CodecError::Encode`] if serialization fails.
pub fn encode_entry<R: Record>(entry: &AuditLedgerEntry<R>) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(&EncodedEntry::from_entry(entry), &mut bytes).map_err(|e| {
        CodecError::Encode {
            message: e.to_string(),
        }
    })?;
    Ok(bytes)
}

/// Decodes an entry without a schema.
///
/// # Errors
///
/// [`CodecError::Decode`] for malformed bytes.
pub fn decode_raw(bytes: &[u8]) -> Result<EncodedEntry, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode {
        message: e.to_string(),
    })
}

/// Decodes an entry of family `R`.
///
/// # Errors
///
/// [`CodecError::Decode`] for malformed bytes, [`CodecError::Schema`] for an
/// entry that does not fit `R`.
pub fn decode_entry<R: Record>(bytes: &[u8]) -> Result<AuditLedgerEntry<R>, CodecError> {
    decode_raw(bytes)?.into_entry()
}
