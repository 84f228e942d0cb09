//! Records and live entities.

use crate::equivalence::KeyShape;
use crate::error::{FieldError, KeyError};
use crate::field::{FieldId, FieldKind, FieldValue, KeyResolver, Owner, ScalarValue};
use crate::key::{
    actor_value, revision_value, stamp_value, CompositeKey, FieldRef, Schema, ShapeKind,
};
use crate::types::{ActorId, Revision, Timestamp};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The domain fields of one entity family.
///
/// A record type pairs a static [`Schema`] with typed storage for the
/// declared fields. Fields are read and written by id so keys, validation and
/// the ledger codec can work on any family.
///
/// Reading an id the schema does not declare yields [`FieldValue::Null`].
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    /// The family declaration.
    fn schema() -> &'static Schema;

    /// A record with every field null (or its type's empty value).
    fn blank() -> Self;

    /// Reads a field.
    fn field(&self, id: FieldId) -> FieldValue;

    /// Writes a field.
    ///
    /// # Errors
    ///
    /// [`FieldError::UnknownField`] for an undeclared id,
    /// [`FieldError::KindMismatch`] for a value the field cannot hold.
    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError>;

    /// Builds the primary key from the record's key fields.
    ///
    /// # Errors
    ///
    /// See [`CompositeKey::new`].
    fn primary_key(&self) -> Result<CompositeKey, KeyError> {
        self.key(ShapeKind::PrimaryKey)
    }

    /// Builds the key of index `name`.
    ///
    /// # Errors
    ///
    /// [`KeyError::UnknownIndex`] for an undeclared index, otherwise see
    /// [`CompositeKey::new`].
    fn index_key(&self, name: &str) -> Result<CompositeKey, KeyError> {
        let schema = Self::schema();
        let spec = schema.index(name).ok_or_else(|| KeyError::UnknownIndex {
            family: schema.tag,
            name: name.to_string(),
        })?;
        self.key(ShapeKind::Index(spec.name))
    }

    /// Builds a key of a key shape.
    ///
    /// # Errors
    ///
    /// See [`CompositeKey::new`].
    fn key(&self, shape: ShapeKind) -> Result<CompositeKey, KeyError> {
        let schema = Self::schema();
        let values = schema
            .key_fields(shape)
            .unwrap_or_default()
            .iter()
            .map(|id| self.field(*id))
            .collect();
        CompositeKey::new(schema, shape, values)
    }

    /// Validates every declared field.
    ///
    /// # Errors
    ///
    /// The first field that fails [`FieldSpec::validate`](crate::FieldSpec::validate).
    fn validate(&self) -> Result<(), FieldError> {
        Self::schema()
            .fields
            .iter()
            .try_for_each(|spec| spec.validate(&self.field(spec.id)))
    }

    /// Attaches owner handles to every reference field.
    ///
    /// # Errors
    ///
    /// [`KeyError::Resolution`] if an owner cannot be found.
    fn resolve_references(&mut self, resolver: &dyn KeyResolver) -> Result<(), KeyError> {
        for spec in Self::schema().fields {
            if !matches!(spec.kind, FieldKind::Reference { .. }) {
                continue;
            }
            let mut value = self.field(spec.id);
            if value.is_unresolved_reference() {
                value.resolve_in_place(resolver)?;
                self.set_field(spec.id, value)?;
            }
        }
        Ok(())
    }
}

/// A live entity: a record plus its revision and attribution.
#[derive(Debug, Clone)]
pub struct Entity<R: Record> {
    record: R,
    revision: Revision,
    created_by: ActorId,
    created_at: Timestamp,
    updated_by: ActorId,
    updated_at: Timestamp,
}

impl<R: Record> Entity<R> {
    /// A freshly created entity at [`Revision::INITIAL`].
    #[must_use]
    pub fn created(record: R, actor: ActorId, at: Timestamp) -> Self {
        Self {
            record,
            revision: Revision::INITIAL,
            created_by: actor,
            created_at: at,
            updated_by: actor,
            updated_at: at,
        }
    }

    /// Reassembles an entity from stored parts.
    #[must_use]
    pub fn from_parts(
        record: R,
        revision: Revision,
        created_by: ActorId,
        created_at: Timestamp,
        updated_by: ActorId,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            record,
            revision,
            created_by,
            created_at,
            updated_by,
            updated_at,
        }
    }

    /// The successor state: new record, revision and update attribution,
    /// creation attribution kept.
    #[must_use]
    pub(crate) fn advanced(&self, record: R, revision: Revision, actor: ActorId, at: Timestamp) -> Self {
        Self {
            record,
            revision,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_by: actor,
            updated_at: at,
        }
    }

    /// The domain fields.
    #[must_use]
    pub const fn record(&self) -> &R {
        &self.record
    }

    /// Consumes the entity, returning its record.
    #[must_use]
    pub fn into_record(self) -> R {
        self.record
    }

    /// Current revision.
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// Who created the entity.
    #[must_use]
    pub const fn created_by(&self) -> ActorId {
        self.created_by
    }

    /// When the entity was created.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Who last updated the entity.
    #[must_use]
    pub const fn updated_by(&self) -> ActorId {
        self.updated_by
    }

    /// When the entity was last updated.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Primary key.
    ///
    /// # Errors
    ///
    /// See [`Record::primary_key`].
    pub fn primary_key(&self) -> Result<CompositeKey, KeyError> {
        self.record.primary_key()
    }

    /// Key of index `name`.
    ///
    /// # Errors
    ///
    /// See [`Record::index_key`].
    pub fn index_key(&self, name: &str) -> Result<CompositeKey, KeyError> {
        self.record.index_key(name)
    }

    /// Attaches owner handles to every reference field.
    ///
    /// # Errors
    ///
    /// See [`Record::resolve_references`].
    pub fn resolve_references(&mut self, resolver: &dyn KeyResolver) -> Result<(), KeyError> {
        self.record.resolve_references(resolver)
    }
}

impl<R: Record> KeyShape for Entity<R> {
    fn schema(&self) -> &'static Schema {
        R::schema()
    }

    fn shape(&self) -> ShapeKind {
        ShapeKind::Entity
    }

    fn value(&self, field: FieldRef) -> Option<Cow<'_, FieldValue>> {
        let value = match field {
            FieldRef::Record(id) => {
                R::schema().field(id)?;
                self.record.field(id)
            }
            FieldRef::Revision => revision_value(self.revision),
            FieldRef::CreatedBy => actor_value(&self.created_by),
            FieldRef::CreatedAt => stamp_value(self.created_at),
            FieldRef::UpdatedBy => actor_value(&self.updated_by),
            FieldRef::UpdatedAt => stamp_value(self.updated_at),
            FieldRef::AuditCluster
            | FieldRef::AuditStamp
            | FieldRef::AuditAction
            | FieldRef::AuditSession => return None,
        };
        Some(Cow::Owned(value))
    }
}

impl<R: Record> PartialEq for Entity<R> {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision
            && self.created_by == other.created_by
            && self.created_at == other.created_at
            && self.updated_by == other.updated_by
            && self.updated_at == other.updated_at
            && R::schema()
                .fields
                .iter()
                .all(|spec| self.record.field(spec.id) == other.record.field(spec.id))
    }
}

impl<R: Record> Eq for Entity<R> {}

impl<R: Record> Hash for Entity<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        R::schema().tag.hash(state);
        for id in R::schema().primary_key {
            self.record.field(*id).hash(state);
        }
        self.created_by.hash(state);
        self.created_at.hash(state);
        self.updated_by.hash(state);
        self.updated_at.hash(state);
    }
}

/// An entity handed out as the owner of references into its family.
#[derive(Debug, Clone)]
pub struct EntityOwner<R: Record> {
    id: ScalarValue,
    entity: Entity<R>,
}

impl<R: Record> EntityOwner<R> {
    /// Wraps `entity` as the owner named by `id`.
    #[must_use]
    pub fn new(id: ScalarValue, entity: Entity<R>) -> Self {
        Self { id, entity }
    }

    /// The owning entity.
    #[must_use]
    pub const fn entity(&self) -> &Entity<R> {
        &self.entity
    }
}

impl<R: Record> Owner for EntityOwner<R> {
    fn type_tag(&self) -> &'static str {
        R::schema().tag
    }

    fn owner_id(&self) -> ScalarValue {
        self.id.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
