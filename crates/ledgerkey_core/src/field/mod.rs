//! Field declarations and values.
//!
//! A [`FieldSpec`] declares one field of an entity family: its kind, its
//! role (key, mutable or fixed), nullability and bounds. A [`FieldValue`] is
//! the value a record holds for a field: null, a [`ScalarValue`] or a
//! [`ReferenceKeyField`].

mod reference;
mod scalar;

pub use reference::{KeyResolver, MapResolver, Owner, OwnerHandle, OwnerRecord, ReferenceKeyField};
pub use scalar::{ScalarKind, ScalarValue};

use crate::error::{FieldError, ResolutionError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a field within its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub u16);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A scalar value.
    Scalar(ScalarKind),
    /// A reference to an owner of family `target` named by an `id` scalar.
    Reference {
        /// Target family tag.
        target: &'static str,
        /// Kind of the referenced id.
        id: ScalarKind,
    },
}

impl FieldKind {
    /// Kind of the scalar carried by this field.
    #[must_use]
    pub const fn scalar_kind(&self) -> ScalarKind {
        match self {
            Self::Scalar(kind) | Self::Reference { id: kind, .. } => *kind,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Reference { target, id } => write!(f, "ref {target}({id})"),
        }
    }
}

/// How a field behaves under update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Part of the primary key. Never changed by update.
    Key,
    /// Domain field copied from the caller on update.
    Mutable,
    /// Domain field set at create and kept thereafter.
    Fixed,
}

/// Declaration of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field id, unique within the family.
    pub id: FieldId,
    /// Field name.
    pub name: &'static str,
    /// Value kind.
    pub kind: FieldKind,
    /// Update behaviour.
    pub role: FieldRole,
    /// Whether null is accepted.
    pub nullable: bool,
    /// Inclusive lower bound for integers.
    pub min: Option<i64>,
    /// Inclusive upper bound for integers.
    pub max: Option<i64>,
    /// Maximum characters for text, exact byte length for hashes.
    pub length: Option<usize>,
}

impl FieldSpec {
    const fn with_kind(id: u16, name: &'static str, kind: FieldKind) -> Self {
        Self {
            id: FieldId(id),
            name,
            kind,
            role: FieldRole::Fixed,
            nullable: false,
            min: None,
            max: None,
            length: None,
        }
    }

    /// A 16-bit integer field.
    #[must_use]
    pub const fn int16(id: u16, name: &'static str) -> Self {
        Self::with_kind(id, name, FieldKind::Scalar(ScalarKind::Int16))
    }

    /// A 32-bit integer field.
    #[must_use]
    pub const fn int32(id: u16, name: &'static str) -> Self {
        Self::with_kind(id, name, FieldKind::Scalar(ScalarKind::Int32))
    }

    /// A 64-bit integer field.
    #[must_use]
    pub const fn int64(id: u16, name: &'static str) -> Self {
        Self::with_kind(id, name, FieldKind::Scalar(ScalarKind::Int64))
    }

    /// A text field of at most `max_len` characters.
    #[must_use]
    pub const fn text(id: u16, name: &'static str, max_len: usize) -> Self {
        let mut spec = Self::with_kind(id, name, FieldKind::Scalar(ScalarKind::Text));
        spec.length = Some(max_len);
        spec
    }

    /// A hash field of exactly `len` bytes.
    #[must_use]
    pub const fn hash(id: u16, name: &'static str, len: usize) -> Self {
        let mut spec = Self::with_kind(id, name, FieldKind::Scalar(ScalarKind::Hash));
        spec.length = Some(len);
        spec
    }

    /// A reference to family `target` whose ids are of kind `id_kind`.
    #[must_use]
    pub const fn reference(
        id: u16,
        name: &'static str,
        target: &'static str,
        id_kind: ScalarKind,
    ) -> Self {
        Self::with_kind(id, name, FieldKind::Reference { target, id: id_kind })
    }

    /// Marks the field as part of the primary key.
    #[must_use]
    pub const fn key(mut self) -> Self {
        self.role = FieldRole::Key;
        self.nullable = false;
        self
    }

    /// Marks the field as updatable.
    #[must_use]
    pub const fn mutable(mut self) -> Self {
        self.role = FieldRole::Mutable;
        self
    }

    /// Accepts null.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Bounds an integer field (inclusive).
    #[must_use]
    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Bounds the length of a text or hash field.
    #[must_use]
    pub const fn length(mut self, len: usize) -> Self {
        self.length = Some(len);
        self
    }

    /// Whether this field belongs to the primary key.
    #[must_use]
    pub const fn is_key(&self) -> bool {
        matches!(self.role, FieldRole::Key)
    }

    /// Checks `value` against this declaration.
    ///
    /// # Errors
    ///
    /// - [`FieldError::NullValue`] for null in a non-nullable field
    /// - [`FieldError::KindMismatch`] for a value of the wrong kind or target
    /// - [`FieldError::OutOfRange`] for a bound or length violation
    pub fn validate(&self, value: &FieldValue) -> Result<(), FieldError> {
        match (value, self.kind) {
            (FieldValue::Null, _) if self.nullable => Ok(()),
            (FieldValue::Null, _) => Err(FieldError::NullValue { field: self.name }),
            (FieldValue::Scalar(scalar), FieldKind::Scalar(kind)) => {
                self.expect_kind(kind, scalar)?;
                self.check_bounds(scalar)
            }
            (FieldValue::Reference(reference), FieldKind::Reference { target, id }) => {
                if reference.target() != target {
                    return Err(FieldError::KindMismatch {
                        field: self.name,
                        expected: self.kind.to_string(),
                        found: format!("ref {}", reference.target()),
                    });
                }
                self.expect_kind(id, reference.id())?;
                self.check_bounds(reference.id())
            }
            (found, _) => Err(FieldError::KindMismatch {
                field: self.name,
                expected: self.kind.to_string(),
                found: found.kind_name(),
            }),
        }
    }

    fn expect_kind(&self, kind: ScalarKind, scalar: &ScalarValue) -> Result<(), FieldError> {
        if scalar.kind() == kind {
            Ok(())
        } else {
            Err(FieldError::KindMismatch {
                field: self.name,
                expected: self.kind.to_string(),
                found: scalar.kind().to_string(),
            })
        }
    }

    fn check_bounds(&self, scalar: &ScalarValue) -> Result<(), FieldError> {
        match scalar {
            ScalarValue::Text(s) => {
                let chars = s.chars().count();
                match self.length {
                    Some(max) if chars > max => Err(FieldError::out_of_range(
                        self.name,
                        format!("{chars} characters exceeds maximum of {max}"),
                    )),
                    _ => Ok(()),
                }
            }
            ScalarValue::Hash(bytes) => match self.length {
                Some(len) if bytes.len() != len => Err(FieldError::out_of_range(
                    self.name,
                    format!("hash of {} bytes, expected {len}", bytes.len()),
                )),
                _ => Ok(()),
            },
            ScalarValue::Int16(_) | ScalarValue::Int32(_) | ScalarValue::Int64(_) => {
                let v = scalar.as_i64().unwrap_or_default();
                if let Some(min) = self.min.filter(|min| v < *min) {
                    return Err(FieldError::out_of_range(
                        self.name,
                        format!("{v} is below minimum {min}"),
                    ));
                }
                if let Some(max) = self.max.filter(|max| v > *max) {
                    return Err(FieldError::out_of_range(
                        self.name,
                        format!("{v} is above maximum {max}"),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// The value a record holds for one field.
///
/// The derived ordering puts [`FieldValue::Null`] before every non-null value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    /// No value.
    Null,
    /// A scalar value.
    Scalar(ScalarValue),
    /// A reference to an owner.
    Reference(ReferenceKeyField),
}

impl FieldValue {
    /// A text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(ScalarValue::Text(value.into()))
    }

    /// An unresolved reference.
    #[must_use]
    pub fn reference(target: &'static str, id: impl Into<ScalarValue>) -> Self {
        Self::Reference(ReferenceKeyField::unresolved(target, id))
    }

    /// `Scalar` for `Some`, `Null` for `None`.
    #[must_use]
    pub fn scalar_or_null<T: Into<ScalarValue>>(value: Option<T>) -> Self {
        value.map_or(Self::Null, |v| Self::Scalar(v.into()))
    }

    /// `Reference` for `Some`, `Null` for `None`.
    #[must_use]
    pub fn reference_or_null(value: Option<ReferenceKeyField>) -> Self {
        value.map_or(Self::Null, Self::Reference)
    }

    /// Whether this is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The scalar carried by this value: the value itself, or a reference's id.
    #[must_use]
    pub fn scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Null => None,
            Self::Scalar(scalar) => Some(scalar),
            Self::Reference(reference) => Some(reference.id()),
        }
    }

    /// The reference, if this is one.
    #[must_use]
    pub fn as_reference(&self) -> Option<&ReferenceKeyField> {
        match self {
            Self::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Whether this is a reference without an owner handle.
    #[must_use]
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(self, Self::Reference(r) if !r.is_resolved())
    }

    /// Attaches the owner handle to a reference value. Other values are left
    /// as they are.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotFound`] if the owner cannot be found.
    pub fn resolve_in_place(&mut self, resolver: &dyn KeyResolver) -> Result<(), ResolutionError> {
        match self {
            Self::Reference(reference) => reference.resolve_in_place(resolver),
            Self::Null | Self::Scalar(_) => Ok(()),
        }
    }

    /// A copy with every owner handle dropped.
    #[must_use]
    pub fn detached(&self) -> Self {
        match self {
            Self::Reference(reference) => Self::Reference(reference.detached()),
            other => other.clone(),
        }
    }

    /// Converts into an optional string.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KindMismatch`] for a non-text value.
    pub fn into_text(self, field: &'static str) -> Result<Option<String>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Scalar(ScalarValue::Text(s)) => Ok(Some(s)),
            other => Err(other.mismatch(field, "text")),
        }
    }

    /// Converts into an optional `i16`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KindMismatch`] for a non-`int16` value.
    pub fn into_i16(self, field: &'static str) -> Result<Option<i16>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Scalar(ScalarValue::Int16(v)) => Ok(Some(v)),
            other => Err(other.mismatch(field, "int16")),
        }
    }

    /// Converts into an optional `i32`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KindMismatch`] for a non-`int32` value.
    pub fn into_i32(self, field: &'static str) -> Result<Option<i32>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Scalar(ScalarValue::Int32(v)) => Ok(Some(v)),
            other => Err(other.mismatch(field, "int32")),
        }
    }

    /// Converts into an optional `i64`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KindMismatch`] for a non-`int64` value.
    pub fn into_i64(self, field: &'static str) -> Result<Option<i64>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Scalar(ScalarValue::Int64(v)) => Ok(Some(v)),
            other => Err(other.mismatch(field, "int64")),
        }
    }

    /// Converts into optional hash bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KindMismatch`] for a non-hash value.
    pub fn into_hash(self, field: &'static str) -> Result<Option<Vec<u8>>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Scalar(ScalarValue::Hash(bytes)) => Ok(Some(bytes)),
            other => Err(other.mismatch(field, "hash")),
        }
    }

    /// Converts into an optional reference.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KindMismatch`] for a non-reference value.
    pub fn into_reference(
        self,
        field: &'static str,
    ) -> Result<Option<ReferenceKeyField>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Reference(reference) => Ok(Some(reference)),
            other => Err(other.mismatch(field, "reference")),
        }
    }

    fn kind_name(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Scalar(scalar) => scalar.kind().to_string(),
            Self::Reference(reference) => format!("ref {}", reference.target()),
        }
    }

    fn mismatch(&self, field: &'static str, expected: &str) -> FieldError {
        FieldError::KindMismatch {
            field,
            expected: expected.to_string(),
            found: self.kind_name(),
        }
    }
}

impl From<ScalarValue> for FieldValue {
    fn from(value: ScalarValue) -> Self {
        Self::Scalar(value)
    }
}

impl From<ReferenceKeyField> for FieldValue {
    fn from(value: ReferenceKeyField) -> Self {
        Self::Reference(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Reference(reference) => write!(f, "{reference}"),
        }
    }
}
