//! Ledger entries.

use crate::entity::{Entity, Record};
use crate::equivalence::KeyShape;
use crate::error::{InvariantViolation, KeyError};
use crate::field::{FieldValue, KeyResolver};
use crate::key::{
    action_value, cluster_value, session_value, stamp_value, AuditKey, FieldRef, Schema,
    ShapeKind,
};
use crate::types::{AuditAction, ClusterId, SessionId, Timestamp};
use std::borrow::Cow;

/// An immutable snapshot of an entity at one mutation.
#[derive(Debug, Clone)]
pub struct AuditLedgerEntry<R: Record> {
    key: AuditKey,
    snapshot: Entity<R>,
}

/// The history shape of a family.
pub type HistoryEntity<R> = AuditLedgerEntry<R>;

fn invalid(action: AuditAction, reason: impl Into<String>) -> InvariantViolation {
    InvariantViolation::InvalidTransition {
        action,
        reason: reason.into(),
    }
}

impl<R: Record> AuditLedgerEntry<R> {
    /// Records one mutation.
    ///
    /// - create: `before` absent, `after` at the initial revision
    /// - update: both present, same key, `after` one revision past `before`;
    ///   only `after` is stored
    /// - delete: `after` absent; `before` is the final live state
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::InvalidTransition`] if the snapshots do not fit
    /// the action.
    pub fn record(
        action: AuditAction,
        before: Option<&Entity<R>>,
        after: Option<&Entity<R>>,
        session: SessionId,
        cluster: ClusterId,
        stamp: Timestamp,
    ) -> Result<Self, InvariantViolation> {
        let snapshot = match (action, before, after) {
            (AuditAction::Create, None, Some(after)) => {
                if !after.revision().is_initial() {
                    return Err(invalid(
                        action,
                        format!("created at {}", after.revision()),
                    ));
                }
                after
            }
            (AuditAction::Update, Some(before), Some(after)) => {
                if before.revision().checked_next() != Some(after.revision()) {
                    return Err(invalid(
                        action,
                        format!("{} does not follow {}", after.revision(), before.revision()),
                    ));
                }
                if before.primary_key().ok() != after.primary_key().ok() {
                    return Err(invalid(action, "primary key changed"));
                }
                after
            }
            (AuditAction::Delete, Some(before), None) => before,
            (action, before, after) => {
                return Err(invalid(
                    action,
                    format!(
                        "before {}, after {}",
                        if before.is_some() { "present" } else { "absent" },
                        if after.is_some() { "present" } else { "absent" },
                    ),
                ))
            }
        };
        let natural = snapshot
            .primary_key()
            .map_err(|e| invalid(action, format!("snapshot key: {e}")))?;
        Ok(Self {
            key: AuditKey {
                cluster,
                stamp,
                action,
                revision: snapshot.revision(),
                session,
                natural,
            },
            snapshot: snapshot.clone(),
        })
    }

    /// Reassembles a decoded entry.
    ///
    /// # Errors
    ///
    /// A [`KeyError`] if the snapshot's key does not match `key.natural`.
    pub fn from_parts(key: AuditKey, snapshot: Entity<R>) -> Result<Self, KeyError> {
        let natural = snapshot.primary_key()?;
        if natural != key.natural || snapshot.revision() != key.revision {
            return Err(KeyError::ShapeMismatch {
                expected: key.to_string(),
                found: format!("{natural} at {}", snapshot.revision()),
            });
        }
        Ok(Self { key, snapshot })
    }

    /// The audit key.
    #[must_use]
    pub const fn key(&self) -> &AuditKey {
        &self.key
    }

    /// The recorded action.
    #[must_use]
    pub const fn action(&self) -> AuditAction {
        self.key.action
    }

    /// The entity state captured by this entry.
    #[must_use]
    pub const fn snapshot(&self) -> &Entity<R> {
        &self.snapshot
    }

    /// Attaches owner handles to the snapshot's references.
    ///
    /// # Errors
    ///
    /// See [`Record::resolve_references`].
    pub fn resolve_references(&mut self, resolver: &dyn KeyResolver) -> Result<(), KeyError> {
        self.snapshot.resolve_references(resolver)?;
        self.key.natural.resolve(resolver)?;
        Ok(())
    }
}

impl<R: Record> PartialEq for AuditLedgerEntry<R> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.snapshot == other.snapshot
    }
}

impl<R: Record> Eq for AuditLedgerEntry<R> {}

impl<R: Record> KeyShape for AuditLedgerEntry<R> {
    fn schema(&self) -> &'static Schema {
        R::schema()
    }

    fn shape(&self) -> ShapeKind {
        ShapeKind::History
    }

    fn value(&self, field: FieldRef) -> Option<Cow<'_, FieldValue>> {
        match field {
            FieldRef::AuditCluster => Some(Cow::Owned(cluster_value(self.key.cluster))),
            FieldRef::AuditStamp => Some(Cow::Owned(stamp_value(self.key.stamp))),
            FieldRef::AuditAction => Some(Cow::Owned(action_value(self.key.action))),
            FieldRef::AuditSession => Some(Cow::Owned(session_value(&self.key.session))),
            FieldRef::Record(_)
            | FieldRef::Revision
            | FieldRef::CreatedBy
            | FieldRef::CreatedAt
            | FieldRef::UpdatedBy
            | FieldRef::UpdatedAt => self.snapshot.value(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{live_node, Node};
    use crate::types::{ActorId, Revision};

    fn stamp() -> Timestamp {
        Timestamp::from_micros(1_000)
    }

    #[test]
    fn create_captures_after() {
        let entity = live_node("clusterA", "nodeX", None, 1);
        let entry = AuditLedgerEntry::record(
            AuditAction::Create,
            None,
            Some(&entity),
            SessionId::new(),
            ClusterId::new(1),
            stamp(),
        )
        .unwrap();
        assert_eq!(entry.action(), AuditAction::Create);
        assert_eq!(entry.key().revision, Revision::INITIAL);
        assert_eq!(entry.snapshot(), &entity);
        assert_eq!(entry.key().natural, entity.primary_key().unwrap());
    }

    #[test]
    fn update_must_advance_by_one() {
        let before = live_node("clusterA", "nodeX", None, 1);
        let good = before.advanced(
            before.record().clone(),
            Revision::new(2),
            ActorId::system(),
            stamp(),
        );
        let skipped = before.advanced(
            before.record().clone(),
            Revision::new(3),
            ActorId::system(),
            stamp(),
        );
        let record = |after: &Entity<Node>| {
            AuditLedgerEntry::record(
                AuditAction::Update,
                Some(&before),
                Some(after),
                SessionId::new(),
                ClusterId::new(1),
                stamp(),
            )
        };
        let entry = record(&good).unwrap();
        assert_eq!(entry.key().revision, Revision::new(2));
        assert!(matches!(
            record(&skipped),
            Err(InvariantViolation::InvalidTransition { .. })
        ));
    }

    #[test]
    fn update_cannot_change_the_key() {
        let before = live_node("clusterA", "nodeX", None, 1);
        let other = live_node("clusterA", "nodeY", None, 1);
        let after = other.advanced(
            other.record().clone(),
            Revision::new(2),
            ActorId::system(),
            stamp(),
        );
        assert!(AuditLedgerEntry::record(
            AuditAction::Update,
            Some(&before),
            Some(&after),
            SessionId::new(),
            ClusterId::new(1),
            stamp(),
        )
        .is_err());
    }

    #[test]
    fn delete_captures_last_live_state() {
        let before = live_node("clusterA", "nodeX", Some("last"), 1);
        let entry = AuditLedgerEntry::record(
            AuditAction::Delete,
            Some(&before),
            None,
            SessionId::new(),
            ClusterId::new(1),
            stamp(),
        )
        .unwrap();
        assert_eq!(entry.snapshot(), &before);
        assert_eq!(entry.key().revision, before.revision());
    }

    #[test]
    fn mismatched_presence_is_rejected() {
        let entity = live_node("clusterA", "nodeX", None, 1);
        for (action, before, after) in [
            (AuditAction::Create, Some(&entity), Some(&entity)),
            (AuditAction::Update, None, Some(&entity)),
            (AuditAction::Delete, None, None),
        ] {
            assert!(AuditLedgerEntry::record(
                action,
                before,
                after,
                SessionId::new(),
                ClusterId::new(1),
                stamp(),
            )
            .is_err());
        }
    }

    #[test]
    fn from_parts_checks_the_key() {
        let entity = live_node("clusterA", "nodeX", None, 1);
        let entry = AuditLedgerEntry::record(
            AuditAction::Create,
            None,
            Some(&entity),
            SessionId::new(),
            ClusterId::new(1),
            stamp(),
        )
        .unwrap();
        let rebuilt =
            AuditLedgerEntry::from_parts(entry.key().clone(), entry.snapshot().clone()).unwrap();
        assert_eq!(rebuilt, entry);

        let other = live_node("clusterA", "nodeY", None, 1);
        assert!(AuditLedgerEntry::from_parts(entry.key().clone(), other).is_err());
    }
}
