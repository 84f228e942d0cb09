//! Static family declarations and shape layouts.

use crate::field::{FieldId, FieldSpec};
use std::fmt;

/// A field position within a shape layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldRef {
    /// A declared record field.
    Record(FieldId),
    /// Optimistic-concurrency revision.
    Revision,
    /// Created-by attribution.
    CreatedBy,
    /// Created-at attribution.
    CreatedAt,
    /// Updated-by attribution.
    UpdatedBy,
    /// Updated-at attribution.
    UpdatedAt,
    /// Audit cluster id.
    AuditCluster,
    /// Audit timestamp.
    AuditStamp,
    /// Audit action code.
    AuditAction,
    /// Audit session id.
    AuditSession,
}

impl FieldRef {
    /// The four attribution fields, in layout order.
    pub const ATTRIBUTION: [Self; 4] = [
        Self::CreatedBy,
        Self::CreatedAt,
        Self::UpdatedBy,
        Self::UpdatedAt,
    ];
}

/// The closed set of shapes a family is represented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeKind {
    /// Full live entity.
    Entity,
    /// Full history snapshot.
    History,
    /// Bare primary key.
    PrimaryKey,
    /// Bare history (audit) key.
    HistoryKey,
    /// Secondary index key, by index name.
    Index(&'static str),
}

impl ShapeKind {
    /// Whether this shape carries audit-attribution fields.
    #[must_use]
    pub const fn is_full(self) -> bool {
        match self {
            Self::Entity | Self::History => true,
            Self::PrimaryKey | Self::HistoryKey | Self::Index(_) => false,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::History => f.write_str("history"),
            Self::PrimaryKey => f.write_str("primary key"),
            Self::HistoryKey => f.write_str("history key"),
            Self::Index(name) => write!(f, "index {name}"),
        }
    }
}

/// A secondary index over some of a family's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique within the family.
    pub name: &'static str,
    /// Indexed fields in key order.
    pub fields: &'static [FieldId],
    /// Whether two live entities may share a key.
    pub unique: bool,
}

impl IndexSpec {
    /// A non-unique index.
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [FieldId]) -> Self {
        Self {
            name,
            fields,
            unique: false,
        }
    }

    /// A unique index.
    #[must_use]
    pub const fn unique(name: &'static str, fields: &'static [FieldId]) -> Self {
        Self {
            name,
            fields,
            unique: true,
        }
    }
}

/// Declaration of an entity family.
///
/// Schemas are `'static` and usually declared as statics next to the record
/// type:
///
/// ```rust
/// use ledgerkey_core::{FieldId, FieldSpec, IndexSpec, Schema};
///
/// static FIELDS: [FieldSpec; 2] = [
///     FieldSpec::text(0, "name", 64).key(),
///     FieldSpec::text(1, "description", 50).mutable().nullable(),
/// ];
/// static INDEXES: [IndexSpec; 1] = [IndexSpec::new("DescIdx", &[FieldId(1)])];
/// static SCHEMA: Schema = Schema::new("Cluster", &FIELDS, &[FieldId(0)]).with_indexes(&INDEXES);
///
/// assert_eq!(SCHEMA.index("DescIdx").unwrap().fields, &[FieldId(1)]);
/// ```
#[derive(Debug)]
pub struct Schema {
    /// Family tag.
    pub tag: &'static str,
    /// Every declared field.
    pub fields: &'static [FieldSpec],
    /// Primary key fields in key order.
    pub primary_key: &'static [FieldId],
    /// Secondary indexes.
    pub indexes: &'static [IndexSpec],
    /// Whether a shape whose layout is a strict prefix of another's orders
    /// before it when the shared prefix is equal. Otherwise they order equal.
    pub prefix_ordering: bool,
}

impl Schema {
    /// Declares a family with no secondary indexes.
    #[must_use]
    pub const fn new(
        tag: &'static str,
        fields: &'static [FieldSpec],
        primary_key: &'static [FieldId],
    ) -> Self {
        Self {
            tag,
            fields,
            primary_key,
            indexes: &[],
            prefix_ordering: false,
        }
    }

    /// Adds secondary indexes.
    #[must_use]
    pub const fn with_indexes(mut self, indexes: &'static [IndexSpec]) -> Self {
        self.indexes = indexes;
        self
    }

    /// Sets the prefix ordering fallback.
    #[must_use]
    pub const fn with_prefix_ordering(mut self, value: bool) -> Self {
        self.prefix_ordering = value;
        self
    }

    /// Looks up a field declaration.
    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Looks up a field declaration by name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up an index.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&'static IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Whether `id` is part of the primary key.
    #[must_use]
    pub fn is_key_field(&self, id: FieldId) -> bool {
        self.primary_key.contains(&id)
    }

    /// Declared fields outside the primary key, in declaration order.
    pub fn non_key_fields(&self) -> impl Iterator<Item = &'static FieldSpec> + '_ {
        let fields: &'static [FieldSpec] = self.fields;
        fields.iter().filter(|f| !self.is_key_field(f.id))
    }

    /// Field ids making up `shape`'s key, for the key shapes.
    #[must_use]
    pub fn key_fields(&self, shape: ShapeKind) -> Option<&'static [FieldId]> {
        match shape {
            ShapeKind::PrimaryKey => Some(self.primary_key),
            ShapeKind::Index(name) => self.index(name).map(|i| i.fields),
            ShapeKind::Entity | ShapeKind::History | ShapeKind::HistoryKey => None,
        }
    }

    /// The ordered fields a shape declares.
    ///
    /// - primary key: the key fields
    /// - index: the indexed fields
    /// - entity: key fields, other fields, revision, attribution
    /// - history key: cluster, stamp, action, revision, session, key fields
    /// - history: the history key layout, other fields, attribution
    #[must_use]
    pub fn layout(&self, shape: ShapeKind) -> Vec<FieldRef> {
        let key = self.primary_key.iter().copied().map(FieldRef::Record);
        let rest = self.non_key_fields().map(|f| FieldRef::Record(f.id));
        match shape {
            ShapeKind::PrimaryKey | ShapeKind::Index(_) => self
                .key_fields(shape)
                .unwrap_or_default()
                .iter()
                .copied()
                .map(FieldRef::Record)
                .collect(),
            ShapeKind::Entity => key
                .chain(rest)
                .chain(std::iter::once(FieldRef::Revision))
                .chain(FieldRef::ATTRIBUTION)
                .collect(),
            ShapeKind::HistoryKey => Self::audit_prefix().into_iter().chain(key).collect(),
            ShapeKind::History => Self::audit_prefix()
                .into_iter()
                .chain(key)
                .chain(rest)
                .chain(FieldRef::ATTRIBUTION)
                .collect(),
        }
    }

    const fn audit_prefix() -> [FieldRef; 5] {
        [
            FieldRef::AuditCluster,
            FieldRef::AuditStamp,
            FieldRef::AuditAction,
            FieldRef::Revision,
            FieldRef::AuditSession,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ScalarKind;

    static FIELDS: [FieldSpec; 3] = [
        FieldSpec::reference(0, "cluster", "Cluster", ScalarKind::Text).key(),
        FieldSpec::text(1, "host_name", 192).key(),
        FieldSpec::text(2, "description", 50).mutable().nullable(),
    ];
    static INDEXES: [IndexSpec; 1] = [IndexSpec::new("ClusterIdx", &[FieldId(0)])];
    static SCHEMA: Schema =
        Schema::new("HostNode", &FIELDS, &[FieldId(0), FieldId(1)]).with_indexes(&INDEXES);

    #[test]
    fn lookups() {
        assert_eq!(SCHEMA.field(FieldId(2)).unwrap().name, "description");
        assert_eq!(SCHEMA.field_by_name("host_name").unwrap().id, FieldId(1));
        assert!(SCHEMA.index("ClusterIdx").is_some());
        assert!(SCHEMA.index("Nope").is_none());
        assert!(SCHEMA.is_key_field(FieldId(1)));
        assert!(!SCHEMA.is_key_field(FieldId(2)));
    }

    #[test]
    fn entity_layout_starts_with_key() {
        let layout = SCHEMA.layout(ShapeKind::Entity);
        assert_eq!(
            layout,
            vec![
                FieldRef::Record(FieldId(0)),
                FieldRef::Record(FieldId(1)),
                FieldRef::Record(FieldId(2)),
                FieldRef::Revision,
                FieldRef::CreatedBy,
                FieldRef::CreatedAt,
                FieldRef::UpdatedBy,
                FieldRef::UpdatedAt,
            ]
        );
        assert!(layout.starts_with(&SCHEMA.layout(ShapeKind::PrimaryKey)));
        assert!(layout.starts_with(&SCHEMA.layout(ShapeKind::Index("ClusterIdx"))));
    }

    #[test]
    fn history_layout_starts_with_history_key() {
        let key = SCHEMA.layout(ShapeKind::HistoryKey);
        let history = SCHEMA.layout(ShapeKind::History);
        assert_eq!(key.len(), 7);
        assert!(history.starts_with(&key));
        assert_eq!(
            history.iter().filter(|f| **f == FieldRef::Revision).count(),
            1
        );
        assert!(history.ends_with(&FieldRef::ATTRIBUTION));
    }

    #[test]
    fn unknown_index_has_empty_layout() {
        assert!(SCHEMA.layout(ShapeKind::Index("Nope")).is_empty());
    }
}
