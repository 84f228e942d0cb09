//! Primary and secondary-index keys.

use crate::equivalence::KeyShape;
use crate::error::{FieldError, KeyError, ResolutionError};
use crate::field::{FieldId, FieldValue, KeyResolver};
use crate::key::schema::{FieldRef, Schema, ShapeKind};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An ordered, fixed-arity tuple of key components.
///
/// A composite key is either a family's primary key or one of its secondary
/// index keys. Every component is validated against its field declaration on
/// construction.
///
/// The `Eq`/`Ord`/`Hash` implementations give the storage order: family tag,
/// shape, then components lexicographically with nulls first. They never
/// fail. Cross-shape comparison goes through [`crate::equivalence`].
#[derive(Clone)]
pub struct CompositeKey {
    schema: &'static Schema,
    shape: ShapeKind,
    values: Vec<FieldValue>,
}

impl CompositeKey {
    /// Builds a key of `shape` (primary key or an index of `schema`).
    ///
    /// # Errors
    ///
    /// - [`KeyError::ShapeMismatch`] if `shape` is not a key shape of `schema`
    /// - [`KeyError::Arity`] if the number of values is wrong
    /// - [`KeyError::Field`] if a component fails validation
    pub fn new(
        schema: &'static Schema,
        shape: ShapeKind,
        values: Vec<FieldValue>,
    ) -> Result<Self, KeyError> {
        let fields = schema
            .key_fields(shape)
            .ok_or_else(|| KeyError::ShapeMismatch {
                expected: format!("{} key", schema.tag),
                found: shape.to_string(),
            })?;
        if fields.len() != values.len() {
            return Err(KeyError::Arity {
                family: schema.tag,
                shape: shape.to_string(),
                expected: fields.len(),
                found: values.len(),
            });
        }
        for (id, value) in fields.iter().zip(&values) {
            let spec = schema.field(*id).ok_or(FieldError::UnknownField {
                family: schema.tag,
                field: *id,
            })?;
            spec.validate(value)?;
        }
        Ok(Self {
            schema,
            shape,
            values,
        })
    }

    /// Builds a primary key.
    ///
    /// # Errors
    ///
    /// See [`CompositeKey::new`].
    pub fn primary(schema: &'static Schema, values: Vec<FieldValue>) -> Result<Self, KeyError> {
        Self::new(schema, ShapeKind::PrimaryKey, values)
    }

    /// Builds a key of the index named `name`.
    ///
    /// # Errors
    ///
    /// [`KeyError::UnknownIndex`] if `schema` has no such index, otherwise
    /// see [`CompositeKey::new`].
    pub fn index(
        schema: &'static Schema,
        name: &str,
        values: Vec<FieldValue>,
    ) -> Result<Self, KeyError> {
        let spec = schema.index(name).ok_or_else(|| KeyError::UnknownIndex {
            family: schema.tag,
            name: name.to_string(),
        })?;
        Self::new(schema, ShapeKind::Index(spec.name), values)
    }

    /// Projects a key of `shape` out of a richer shape of the same family.
    ///
    /// # Errors
    ///
    /// [`KeyError::ShapeMismatch`] if `source` does not carry every field the
    /// key needs, otherwise see [`CompositeKey::new`].
    pub fn project<S: KeyShape + ?Sized>(source: &S, shape: ShapeKind) -> Result<Self, KeyError> {
        let schema = source.schema();
        let mismatch = || KeyError::ShapeMismatch {
            expected: format!("{} carrying {shape}", schema.tag),
            found: source.shape().to_string(),
        };
        let fields = schema.key_fields(shape).ok_or_else(mismatch)?;
        let values = fields
            .iter()
            .map(|id| {
                source
                    .value(FieldRef::Record(*id))
                    .map(Cow::into_owned)
                    .ok_or_else(mismatch)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(schema, shape, values)
    }

    /// The family this key belongs to.
    #[must_use]
    pub const fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Primary key or index.
    #[must_use]
    pub const fn shape(&self) -> ShapeKind {
        self.shape
    }

    /// Components in key order.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Field ids of the components, in key order.
    #[must_use]
    pub fn fields(&self) -> &'static [FieldId] {
        self.schema.key_fields(self.shape).unwrap_or_default()
    }

    /// The component for field `id`.
    #[must_use]
    pub fn get(&self, id: FieldId) -> Option<&FieldValue> {
        let position = self.fields().iter().position(|f| *f == id)?;
        self.values.get(position)
    }

    /// Whether any component is null.
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.values.iter().any(FieldValue::is_null)
    }

    /// Whether every reference component has an owner handle.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.values.iter().any(FieldValue::is_unresolved_reference)
    }

    /// Attaches owner handles to every reference component.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotFound`] for the first reference that
    /// cannot be resolved; earlier components stay resolved.
    pub fn resolve(&mut self, resolver: &dyn KeyResolver) -> Result<(), ResolutionError> {
        for value in &mut self.values {
            value.resolve_in_place(resolver)?;
        }
        Ok(())
    }

    /// A copy without owner handles.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            schema: self.schema,
            shape: self.shape,
            values: self.values.iter().map(FieldValue::detached).collect(),
        }
    }
}

impl KeyShape for CompositeKey {
    fn schema(&self) -> &'static Schema {
        self.schema
    }

    fn shape(&self) -> ShapeKind {
        self.shape
    }

    fn value(&self, field: FieldRef) -> Option<Cow<'_, FieldValue>> {
        match field {
            FieldRef::Record(id) => self.get(id).map(Cow::Borrowed),
            _ => None,
        }
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        self.schema.tag == other.schema.tag
            && self.shape == other.shape
            && self.values == other.values
    }
}

impl Eq for CompositeKey {}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.schema
            .tag
            .cmp(other.schema.tag)
            .then_with(|| self.shape.cmp(&other.shape))
            .then_with(|| self.values.cmp(&other.values))
    }
}

impl Hash for CompositeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema.tag.hash(state);
        self.shape.hash(state);
        self.values.hash(state);
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("family", &self.schema.tag)
            .field("shape", &self.shape)
            .field("values", &self.values)
            .finish()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema.tag)?;
        if let ShapeKind::Index(name) = self.shape {
            write!(f, ".{name}")?;
        }
        f.write_str("(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{MapResolver, OwnerRecord, ScalarValue};
    use crate::test_support::{node_key, NODE};

    #[test]
    fn primary_key_validates_components() {
        assert!(node_key("clusterA", "nodeX").is_ok());
        assert!(matches!(
            CompositeKey::primary(&NODE, vec![FieldValue::reference("Cluster", "a")]),
            Err(KeyError::Arity {
                expected: 2,
                found: 1,
                ..
            })
        ));
        assert!(matches!(
            CompositeKey::primary(
                &NODE,
                vec![FieldValue::reference("Cluster", "a"), FieldValue::Null]
            ),
            Err(KeyError::Field(FieldError::NullValue { .. }))
        ));
    }

    #[test]
    fn unknown_index_is_rejected() {
        assert!(matches!(
            CompositeKey::index(&NODE, "Nope", vec![]),
            Err(KeyError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn index_keys_accept_nullable_components() {
        let key = CompositeKey::index(
            &NODE,
            "DescIdx",
            vec![FieldValue::reference("Cluster", "a"), FieldValue::Null],
        )
        .unwrap();
        assert!(key.has_null());
        assert_eq!(key.shape(), ShapeKind::Index("DescIdx"));
    }

    #[test]
    fn storage_order_is_lexicographic_with_nulls_first() {
        let a = node_key("a", "z").unwrap();
        let b = node_key("b", "a").unwrap();
        assert!(a < b);

        let null_desc = CompositeKey::index(
            &NODE,
            "DescIdx",
            vec![FieldValue::reference("Cluster", "a"), FieldValue::Null],
        )
        .unwrap();
        let some_desc = CompositeKey::index(
            &NODE,
            "DescIdx",
            vec![FieldValue::reference("Cluster", "a"), FieldValue::text("")],
        )
        .unwrap();
        assert!(null_desc < some_desc);
    }

    #[test]
    fn resolution_attaches_owners() {
        let resolver = MapResolver::new();
        resolver.register(OwnerRecord::handle("Cluster", "clusterA"));

        let mut key = node_key("clusterA", "nodeX").unwrap();
        assert!(!key.is_resolved());
        key.resolve(&resolver).unwrap();
        assert!(key.is_resolved());
        assert!(!key.detached().is_resolved());
        assert_eq!(key.detached(), key);

        let mut orphan = node_key("clusterB", "nodeX").unwrap();
        assert!(orphan.resolve(&resolver).is_err());
    }

    #[test]
    fn get_by_field() {
        let key = node_key("clusterA", "nodeX").unwrap();
        assert_eq!(
            key.get(FieldId(1)).and_then(FieldValue::scalar),
            Some(&ScalarValue::from("nodeX"))
        );
        assert_eq!(key.get(FieldId(2)), None);
    }

    #[test]
    fn display() {
        let key = node_key("clusterA", "nodeX").unwrap();
        assert_eq!(key.to_string(), "Node(clusterA, nodeX)");
    }
}
