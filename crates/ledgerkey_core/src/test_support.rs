//! Families and builders shared by unit tests.

use crate::audit::AuditLedgerEntry;
use crate::entity::{Entity, Record};
use crate::error::{FieldError, KeyError};
use crate::field::{
    FieldId, FieldSpec, FieldValue, OwnerRecord, ReferenceKeyField, ScalarKind, ScalarValue,
};
use crate::key::{AuditKey, CompositeKey, IndexSpec, Schema, ShapeKind};
use crate::types::{ActorId, AuditAction, ClusterId, SessionId, Timestamp};

static NODE_FIELDS: [FieldSpec; 5] = [
    FieldSpec::reference(0, "cluster", "Cluster", ScalarKind::Text).key(),
    FieldSpec::text(1, "host_name", 32).key(),
    FieldSpec::text(2, "description", 50).mutable().nullable(),
    FieldSpec::int32(3, "rank").range(0, 100).mutable().nullable(),
    FieldSpec::hash(4, "tag", 4).nullable(),
];

static NODE_INDEXES: [IndexSpec; 3] = [
    IndexSpec::new("ClusterIdx", &[FieldId(0)]),
    IndexSpec::unique("DescIdx", &[FieldId(0), FieldId(2)]),
    IndexSpec::new("RankIdx", &[FieldId(3)]),
];

pub(crate) static NODE: Schema =
    Schema::new("Node", &NODE_FIELDS, &[FieldId(0), FieldId(1)]).with_indexes(&NODE_INDEXES);

pub(crate) static PREFIX_NODE: Schema =
    Schema::new("PrefixNode", &NODE_FIELDS, &[FieldId(0), FieldId(1)])
        .with_indexes(&NODE_INDEXES)
        .with_prefix_ordering(true);

/// A host inside a cluster, keyed by (cluster, host name).
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    pub(crate) cluster: Option<ReferenceKeyField>,
    pub(crate) host_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) rank: Option<i32>,
    pub(crate) tag: Option<Vec<u8>>,
}

impl Node {
    pub(crate) fn new(cluster: &str, host: &str) -> Self {
        Self {
            cluster: Some(ReferenceKeyField::unresolved("Cluster", cluster)),
            host_name: Some(host.to_string()),
            ..Self::default()
        }
    }
}

impl Record for Node {
    fn schema() -> &'static Schema {
        &NODE
    }

    fn blank() -> Self {
        Self::default()
    }

    fn field(&self, id: FieldId) -> FieldValue {
        match id.0 {
            0 => FieldValue::reference_or_null(self.cluster.clone()),
            1 => FieldValue::scalar_or_null(self.host_name.clone()),
            2 => FieldValue::scalar_or_null(self.description.clone()),
            3 => FieldValue::scalar_or_null(self.rank),
            4 => FieldValue::scalar_or_null(self.tag.clone()),
            _ => FieldValue::Null,
        }
    }

    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
        match id.0 {
            0 => self.cluster = value.into_reference("cluster")?,
            1 => self.host_name = value.into_text("host_name")?,
            2 => self.description = value.into_text("description")?,
            3 => self.rank = value.into_i32("rank")?,
            4 => self.tag = value.into_hash("tag")?,
            _ => {
                return Err(FieldError::UnknownField {
                    family: NODE.tag,
                    field: id,
                })
            }
        }
        Ok(())
    }
}

static OTHER_FIELDS: [FieldSpec; 1] = [FieldSpec::int64(0, "id").key()];

static OTHER: Schema = Schema::new("Other", &OTHER_FIELDS, &[FieldId(0)]);

/// A family unrelated to [`Node`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Other {
    id: Option<i64>,
}

impl Record for Other {
    fn schema() -> &'static Schema {
        &OTHER
    }

    fn blank() -> Self {
        Self::default()
    }

    fn field(&self, id: FieldId) -> FieldValue {
        match id.0 {
            0 => FieldValue::scalar_or_null(self.id),
            _ => FieldValue::Null,
        }
    }

    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
        match id.0 {
            0 => self.id = value.into_i64("id")?,
            _ => {
                return Err(FieldError::UnknownField {
                    family: OTHER.tag,
                    field: id,
                })
            }
        }
        Ok(())
    }
}

pub(crate) fn node_key(cluster: &str, host: &str) -> Result<CompositeKey, KeyError> {
    CompositeKey::primary(
        &NODE,
        vec![
            FieldValue::reference("Cluster", cluster),
            FieldValue::text(host),
        ],
    )
}

pub(crate) fn resolved_cluster(id: &str) -> FieldValue {
    FieldValue::Reference(ReferenceKeyField::resolved(OwnerRecord::handle(
        "Cluster", id,
    )))
}

pub(crate) fn resolved_node_key(cluster: &str, host: &str) -> CompositeKey {
    CompositeKey::primary(&NODE, vec![resolved_cluster(cluster), FieldValue::text(host)])
        .unwrap()
}

pub(crate) fn resolved_index(name: &str, cluster: &str, description: Option<&str>) -> CompositeKey {
    let spec = NODE.index(name).unwrap();
    let values = spec
        .fields
        .iter()
        .map(|id| match id.0 {
            0 => resolved_cluster(cluster),
            2 => FieldValue::scalar_or_null(description),
            _ => FieldValue::Null,
        })
        .collect();
    CompositeKey::new(&NODE, ShapeKind::Index(spec.name), values).unwrap()
}

/// A created node with a resolved cluster reference.
pub(crate) fn live_node(
    cluster: &str,
    host: &str,
    description: Option<&str>,
    rank: i32,
) -> Entity<Node> {
    let record = Node {
        cluster: Some(ReferenceKeyField::resolved(OwnerRecord::handle(
            "Cluster", cluster,
        ))),
        host_name: Some(host.to_string()),
        description: description.map(str::to_string),
        rank: Some(rank),
        tag: None,
    };
    Entity::created(record, ActorId::system(), Timestamp::from_micros(1_000))
}

/// A ledger entry for `entity` at its current revision.
pub(crate) fn history_entry(
    entity: &Entity<Node>,
    action: AuditAction,
    stamp: u64,
) -> AuditLedgerEntry<Node> {
    let key = AuditKey {
        cluster: ClusterId::new(1),
        stamp: Timestamp::from_micros(stamp),
        action,
        revision: entity.revision(),
        session: SessionId::from_uuid(uuid::Uuid::nil()),
        natural: entity.primary_key().unwrap(),
    };
    AuditLedgerEntry::from_parts(key, entity.clone()).unwrap()
}

pub(crate) fn other_family_key() -> CompositeKey {
    CompositeKey::primary(&OTHER, vec![FieldValue::from(ScalarValue::Int64(1))]).unwrap()
}
