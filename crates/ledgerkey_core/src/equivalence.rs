//! Equality, ordering and hashing across the shapes of one family.
//!
//! A family is represented in several shapes: the live [`Entity`], its
//! history snapshot ([`AuditLedgerEntry`]), the bare primary key, the bare
//! [`AuditKey`] and any number of secondary index keys. Each shape exposes
//! the fields it declares through [`KeyShape`]; the functions here compare
//! shapes purely through those projections.
//!
//! # Rules
//!
//! - Shapes of different families never compare.
//! - [`equals`] checks the fields both shapes declare. It requires one field
//!   set to contain the other, or the shared fields to cover the whole
//!   primary key. Otherwise the shapes are unrelated.
//! - [`compare`] requires one layout to be a prefix of the other and compares
//!   that prefix. A shorter layout orders first only when the schema enables
//!   [`Schema::prefix_ordering`]; otherwise equal prefixes compare equal.
//! - Unrelated shapes yield [`CompareError::UnsupportedComparison`].
//! - Compared references must be resolved.
//! - Nulls order before every non-null value.
//!
//! Shapes are immutable values, so all of this is safe to call from any
//! number of threads without locking.

use crate::audit::AuditLedgerEntry;
use crate::entity::{Entity, Record};
use crate::error::CompareError;
use crate::field::FieldValue;
use crate::key::{AuditKey, CompositeKey, FieldRef, Schema, ShapeKind};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A representation of a family that exposes its declared fields.
pub trait KeyShape {
    /// The family.
    fn schema(&self) -> &'static Schema;

    /// Which shape this is.
    fn shape(&self) -> ShapeKind;

    /// The value of `field`, or `None` if the shape does not declare it.
    fn value(&self, field: FieldRef) -> Option<Cow<'_, FieldValue>>;

    /// Declared fields in order.
    fn layout(&self) -> Vec<FieldRef> {
        self.schema().layout(self.shape())
    }
}

/// Any shape of a family, as a closed sum.
#[derive(Debug, Clone)]
pub enum Shape<'a, R: Record> {
    /// Live entity.
    Entity(&'a Entity<R>),
    /// History snapshot.
    History(&'a AuditLedgerEntry<R>),
    /// Primary or index key.
    Key(&'a CompositeKey),
    /// Audit key.
    HistoryKey(&'a AuditKey),
}

impl<R: Record> KeyShape for Shape<'_, R> {
    fn schema(&self) -> &'static Schema {
        match self {
            Self::Entity(e) => e.schema(),
            Self::History(h) => h.schema(),
            Self::Key(k) => k.schema(),
            Self::HistoryKey(k) => k.schema(),
        }
    }

    fn shape(&self) -> ShapeKind {
        match self {
            Self::Entity(e) => e.shape(),
            Self::History(h) => h.shape(),
            Self::Key(k) => k.shape(),
            Self::HistoryKey(k) => k.shape(),
        }
    }

    fn value(&self, field: FieldRef) -> Option<Cow<'_, FieldValue>> {
        match self {
            Self::Entity(e) => e.value(field),
            Self::History(h) => h.value(field),
            Self::Key(k) => k.value(field),
            Self::HistoryKey(k) => k.value(field),
        }
    }
}

impl<'a, R: Record> From<&'a Entity<R>> for Shape<'a, R> {
    fn from(value: &'a Entity<R>) -> Self {
        Self::Entity(value)
    }
}

impl<'a, R: Record> From<&'a AuditLedgerEntry<R>> for Shape<'a, R> {
    fn from(value: &'a AuditLedgerEntry<R>) -> Self {
        Self::History(value)
    }
}

impl<'a, R: Record> From<&'a CompositeKey> for Shape<'a, R> {
    fn from(value: &'a CompositeKey) -> Self {
        Self::Key(value)
    }
}

impl<'a, R: Record> From<&'a AuditKey> for Shape<'a, R> {
    fn from(value: &'a AuditKey) -> Self {
        Self::HistoryKey(value)
    }
}

fn describe<S: KeyShape + ?Sized>(shape: &S) -> String {
    format!("{} {}", shape.schema().tag, shape.shape())
}

fn unsupported<A, B>(a: &A, b: &B) -> CompareError
where
    A: KeyShape + ?Sized,
    B: KeyShape + ?Sized,
{
    CompareError::UnsupportedComparison {
        left: describe(a),
        right: describe(b),
    }
}

fn same_family<A, B>(a: &A, b: &B) -> Result<(), CompareError>
where
    A: KeyShape + ?Sized,
    B: KeyShape + ?Sized,
{
    if a.schema().tag == b.schema().tag {
        Ok(())
    } else {
        Err(unsupported(a, b))
    }
}

/// Reads one field for comparison. Undeclared fields read as null.
fn fetch<S: KeyShape + ?Sized>(
    shape: &S,
    field: FieldRef,
) -> Result<Cow<'_, FieldValue>, CompareError> {
    let value = shape
        .value(field)
        .unwrap_or(Cow::Owned(FieldValue::Null));
    match field {
        FieldRef::Record(id) if value.is_unresolved_reference() => {
            Err(CompareError::UnresolvedReference {
                family: shape.schema().tag,
                field: id,
            })
        }
        _ => Ok(value),
    }
}

/// Fields both shapes declare, in `a`'s order, if the shapes are related.
fn shared_fields<A, B>(a: &A, b: &B) -> Result<Vec<FieldRef>, CompareError>
where
    A: KeyShape + ?Sized,
    B: KeyShape + ?Sized,
{
    same_family(a, b)?;
    let left = a.layout();
    let right = b.layout();
    let shared: Vec<FieldRef> = left.iter().filter(|f| right.contains(f)).copied().collect();
    let covers_key = a
        .schema()
        .primary_key
        .iter()
        .all(|id| shared.contains(&FieldRef::Record(*id)));
    let nested = shared.len() == left.len() || shared.len() == right.len();
    if shared.is_empty() || !(nested || covers_key) {
        return Err(unsupported(a, b));
    }
    Ok(shared)
}

/// Whether `a` and `b` agree on every field both declare.
///
/// # Errors
///
/// [`CompareError::UnsupportedComparison`] for unrelated shapes,
/// [`CompareError::UnresolvedReference`] for an unresolved shared reference.
pub fn equals<A, B>(a: &A, b: &B) -> Result<bool, CompareError>
where
    A: KeyShape + ?Sized,
    B: KeyShape + ?Sized,
{
    for field in shared_fields(a, b)? {
        if fetch(a, field)? != fetch(b, field)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Orders `a` against `b` over their shared layout prefix.
///
/// # Errors
///
/// [`CompareError::UnsupportedComparison`] unless one layout is a prefix of
/// the other, [`CompareError::UnresolvedReference`] for an unresolved
/// compared reference.
pub fn compare<A, B>(a: &A, b: &B) -> Result<Ordering, CompareError>
where
    A: KeyShape + ?Sized,
    B: KeyShape + ?Sized,
{
    same_family(a, b)?;
    let left = a.layout();
    let right = b.layout();
    let common = left.len().min(right.len());
    if common == 0 || left[..common] != right[..common] {
        return Err(unsupported(a, b));
    }
    for field in &left[..common] {
        let ordering = fetch(a, *field)?.cmp(&fetch(b, *field)?);
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    if a.schema().prefix_ordering {
        Ok(left.len().cmp(&right.len()))
    } else {
        Ok(Ordering::Equal)
    }
}

/// Hashes the given fields of `shape`.
///
/// # Errors
///
/// [`CompareError::UnresolvedReference`] for an unresolved reference.
pub fn hash_fields<S: KeyShape + ?Sized>(shape: &S, fields: &[FieldRef]) -> Result<u64, CompareError> {
    let mut hasher = DefaultHasher::new();
    shape.schema().tag.hash(&mut hasher);
    for field in fields {
        fetch(shape, *field)?.hash(&mut hasher);
    }
    Ok(hasher.finish())
}

/// Hashes a shape.
///
/// Bare keys hash their natural-key fields only (an index key hashes its
/// indexed fields); full entity and history shapes fold in the attribution
/// fields. Revision and audit fields are never hashed.
///
/// # Errors
///
/// [`CompareError::UnresolvedReference`] for an unresolved reference.
pub fn hash_shape<S: KeyShape + ?Sized>(shape: &S) -> Result<u64, CompareError> {
    let schema = shape.schema();
    let natural = schema.primary_key.iter().copied().map(FieldRef::Record);
    let fields: Vec<FieldRef> = match shape.shape() {
        ShapeKind::Index(_) => shape.layout(),
        ShapeKind::PrimaryKey | ShapeKind::HistoryKey => natural.collect(),
        ShapeKind::Entity | ShapeKind::History => natural.chain(FieldRef::ATTRIBUTION).collect(),
    };
    hash_fields(shape, &fields)
}

/// Hashes the fields `a` and `b` share, once per side.
///
/// When [`equals`] holds, both hashes are identical.
///
/// # Errors
///
/// As for [`equals`].
pub fn hash_shared<A, B>(a: &A, b: &B) -> Result<(u64, u64), CompareError>
where
    A: KeyShape + ?Sized,
    B: KeyShape + ?Sized,
{
    let shared = shared_fields(a, b)?;
    Ok((hash_fields(a, &shared)?, hash_fields(b, &shared)?))
}
