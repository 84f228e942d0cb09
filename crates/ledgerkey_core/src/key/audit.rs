//! History (audit) keys.

use crate::equivalence::KeyShape;
use crate::field::FieldValue;
use crate::key::composite::CompositeKey;
use crate::key::schema::{FieldRef, Schema, ShapeKind};
use crate::key::{action_value, cluster_value, revision_value, session_value, stamp_value};
use crate::types::{AuditAction, ClusterId, Revision, SessionId, Timestamp};
use std::borrow::Cow;
use std::fmt;

/// Key of one audit ledger entry.
///
/// The derived ordering follows the field order: cluster, timestamp, action,
/// revision, session, natural key. Within one cluster that is chronological;
/// ties on the timestamp are broken by the remaining fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuditKey {
    /// Cluster the mutation was written in.
    pub cluster: ClusterId,
    /// When the mutation was recorded.
    pub stamp: Timestamp,
    /// What the mutation was.
    pub action: AuditAction,
    /// Revision captured by the snapshot.
    pub revision: Revision,
    /// Session the mutation came from.
    pub session: SessionId,
    /// Primary key of the live entity.
    pub natural: CompositeKey,
}

impl AuditKey {
    /// Family of the audited entity.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        self.natural.schema().tag
    }
}

impl KeyShape for AuditKey {
    fn schema(&self) -> &'static Schema {
        self.natural.schema()
    }

    fn shape(&self) -> ShapeKind {
        ShapeKind::HistoryKey
    }

    fn value(&self, field: FieldRef) -> Option<Cow<'_, FieldValue>> {
        match field {
            FieldRef::Record(id) => self.natural.get(id).map(Cow::Borrowed),
            FieldRef::Revision => Some(Cow::Owned(revision_value(self.revision))),
            FieldRef::AuditCluster => Some(Cow::Owned(cluster_value(self.cluster))),
            FieldRef::AuditStamp => Some(Cow::Owned(stamp_value(self.stamp))),
            FieldRef::AuditAction => Some(Cow::Owned(action_value(self.action))),
            FieldRef::AuditSession => Some(Cow::Owned(session_value(&self.session))),
            FieldRef::CreatedBy
            | FieldRef::CreatedAt
            | FieldRef::UpdatedBy
            | FieldRef::UpdatedAt => None,
        }
    }
}

impl fmt::Display for AuditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} @{} {} {} session {}]",
            self.natural, self.cluster, self.stamp, self.action, self.revision, self.session
        )
    }
}
