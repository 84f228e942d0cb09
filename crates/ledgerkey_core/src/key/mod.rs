//! Composite keys, audit keys and family schemas.

mod audit;
mod composite;
mod schema;

pub use audit::AuditKey;
pub use composite::CompositeKey;
pub use schema::{FieldRef, IndexSpec, Schema, ShapeKind};

use crate::field::{FieldValue, ScalarValue};
use crate::types::{ActorId, AuditAction, ClusterId, Revision, SessionId, Timestamp};

// Non-record layout fields are compared as scalars.

pub(crate) fn revision_value(revision: Revision) -> FieldValue {
    ScalarValue::Int64(i64::try_from(revision.as_u64()).unwrap_or(i64::MAX)).into()
}

pub(crate) fn stamp_value(stamp: Timestamp) -> FieldValue {
    ScalarValue::Int64(i64::try_from(stamp.as_micros()).unwrap_or(i64::MAX)).into()
}

pub(crate) fn actor_value(actor: &ActorId) -> FieldValue {
    ScalarValue::from_uuid(actor.as_uuid()).into()
}

pub(crate) fn session_value(session: &SessionId) -> FieldValue {
    ScalarValue::from_uuid(session.as_uuid()).into()
}

pub(crate) fn cluster_value(cluster: ClusterId) -> FieldValue {
    ScalarValue::Int64(cluster.as_i64()).into()
}

pub(crate) fn action_value(action: AuditAction) -> FieldValue {
    ScalarValue::Int16(action.code()).into()
}
