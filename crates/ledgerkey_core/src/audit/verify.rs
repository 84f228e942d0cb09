//! Ledger consistency checks.
//!
//! Entries are checked in commit order for unique audit keys and per-key
//! revision continuity: create at the initial revision, each update one past
//! the last, delete at the final live revision, and nothing but a fresh
//! create after a delete.

use crate::audit::codec::EncodedEntry;
use crate::audit::AuditLedgerEntry;
use crate::entity::Record;
use crate::field::ScalarValue;
use crate::types::AuditAction;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// One inconsistency found in a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerIssue {
    /// The same audit key appears twice.
    DuplicateKey {
        /// Position in commit order.
        position: usize,
        /// Natural key.
        key: String,
    },
    /// An action code outside create/update/delete.
    UnknownAction {
        /// Position in commit order.
        position: usize,
        /// The code found.
        code: i16,
    },
    /// A create for a key that is already live.
    CreateWhileLive {
        /// Position in commit order.
        position: usize,
        /// Natural key.
        key: String,
    },
    /// An update or delete for a key that is not live.
    NotLive {
        /// Position in commit order.
        position: usize,
        /// Natural key.
        key: String,
        /// The action found.
        action: AuditAction,
    },
    /// A revision that does not continue the key's sequence.
    RevisionGap {
        /// Position in commit order.
        position: usize,
        /// Natural key.
        key: String,
        /// The action found.
        action: AuditAction,
        /// Revision the sequence requires.
        expected: u64,
        /// Revision found.
        found: u64,
    },
}

impl fmt::Display for LedgerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { position, key } => {
                write!(f, "#{position}: duplicate audit key for {key}")
            }
            Self::UnknownAction { position, code } => {
                write!(f, "#{position}: unknown action code {code}")
            }
            Self::CreateWhileLive { position, key } => {
                write!(f, "#{position}: create of live {key}")
            }
            Self::NotLive {
                position,
                key,
                action,
            } => write!(f, "#{position}: {action} of {key} which is not live"),
            Self::RevisionGap {
                position,
                key,
                action,
                expected,
                found,
            } => write!(
                f,
                "#{position}: {action} of {key} at rev:{found}, expected rev:{expected}"
            ),
        }
    }
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Entries checked.
    pub entries: usize,
    /// Keys live after replaying every entry.
    pub live: usize,
    /// Everything found wrong.
    pub issues: Vec<LedgerIssue>,
}

impl VerifyReport {
    /// Whether no issues were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Clone, Copy)]
enum KeyState {
    Live(u64),
    Deleted,
}

type NaturalKey = (String, Vec<Option<ScalarValue>>);
type AuditIdentity = (NaturalKey, i64, u64, i16, u64, Uuid);

/// Verifies encoded entries in commit order.
#[must_use]
pub fn verify_entries(entries: &[EncodedEntry]) -> VerifyReport {
    let mut seen: HashSet<AuditIdentity> = HashSet::new();
    let mut states: HashMap<NaturalKey, KeyState> = HashMap::new();
    let mut issues = Vec::new();

    for (position, entry) in entries.iter().enumerate() {
        let natural: NaturalKey = (entry.family.clone(), entry.natural_key());
        let key = entry.natural_key_string();

        let identity = (
            natural.clone(),
            entry.cluster,
            entry.stamp,
            entry.action,
            entry.revision,
            entry.session,
        );
        if !seen.insert(identity) {
            issues.push(LedgerIssue::DuplicateKey {
                position,
                key: key.clone(),
            });
        }

        let Some(action) = entry.audit_action() else {
            issues.push(LedgerIssue::UnknownAction {
                position,
                code: entry.action,
            });
            continue;
        };

        let state = states.get(&natural).copied();
        let (expected, next) = match (action, state) {
            (AuditAction::Create, Some(KeyState::Live(_))) => {
                issues.push(LedgerIssue::CreateWhileLive { position, key });
                continue;
            }
            (AuditAction::Create, None | Some(KeyState::Deleted)) => {
                (1, KeyState::Live(entry.revision))
            }
            (AuditAction::Update, Some(KeyState::Live(revision))) => {
                (revision.saturating_add(1), KeyState::Live(entry.revision))
            }
            (AuditAction::Delete, Some(KeyState::Live(revision))) => (revision, KeyState::Deleted),
            (AuditAction::Update | AuditAction::Delete, None | Some(KeyState::Deleted)) => {
                issues.push(LedgerIssue::NotLive {
                    position,
                    key,
                    action,
                });
                continue;
            }
        };
        if entry.revision != expected {
            issues.push(LedgerIssue::RevisionGap {
                position,
                key,
                action,
                expected,
                found: entry.revision,
            });
        }
        states.insert(natural, next);
    }

    VerifyReport {
        entries: entries.len(),
        live: states
            .values()
            .filter(|s| matches!(s, KeyState::Live(_)))
            .count(),
        issues,
    }
}

/// Verifies typed entries in the given order.
#[must_use]
pub fn verify_ledger<R: Record>(entries: &[AuditLedgerEntry<R>]) -> VerifyReport {
    let encoded: Vec<EncodedEntry> = entries.iter().map(EncodedEntry::from_entry).collect();
    verify_entries(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{history_entry, live_node};
    use crate::types::{ActorId, Revision, Timestamp};

    fn lifecycle() -> Vec<EncodedEntry> {
        let created = live_node("clusterA", "nodeX", None, 1);
        let updated = created.advanced(
            created.record().clone(),
            Revision::new(2),
            ActorId::system(),
            Timestamp::from_micros(2),
        );
        vec![
            EncodedEntry::from_entry(&history_entry(&created, AuditAction::Create, 1)),
            EncodedEntry::from_entry(&history_entry(&updated, AuditAction::Update, 2)),
            EncodedEntry::from_entry(&history_entry(&updated, AuditAction::Delete, 3)),
        ]
    }

    #[test]
    fn clean_lifecycle() {
        let report = verify_entries(&lifecycle());
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.entries, 3);
        assert_eq!(report.live, 0);
    }

    #[test]
    fn recreate_after_delete_is_fine() {
        let mut entries = lifecycle();
        let mut again = entries[0].clone();
        again.stamp = 4;
        entries.push(again);
        let report = verify_entries(&entries);
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.live, 1);
    }

    #[test]
    fn duplicate_keys_are_reported() {
        let mut entries = lifecycle();
        entries.insert(1, entries[0].clone());
        let report = verify_entries(&entries);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, LedgerIssue::DuplicateKey { position: 1, .. })));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, LedgerIssue::CreateWhileLive { position: 1, .. })));
    }

    #[test]
    fn gaps_are_reported() {
        let mut entries = lifecycle();
        entries[1].revision = 3;
        let report = verify_entries(&entries);
        assert_eq!(
            report.issues[0],
            LedgerIssue::RevisionGap {
                position: 1,
                key: "Node(clusterA, nodeX)".to_string(),
                action: AuditAction::Update,
                expected: 2,
                found: 3,
            }
        );
    }

    #[test]
    fn updates_of_missing_keys_are_reported() {
        let entries = lifecycle();
        let report = verify_entries(&entries[1..]);
        assert!(matches!(
            report.issues.as_slice(),
            [LedgerIssue::NotLive { position: 0, .. }, LedgerIssue::NotLive { position: 1, .. }]
        ));
    }

    #[test]
    fn unknown_actions_are_reported() {
        let mut entries = lifecycle();
        entries[2].action = 42;
        let report = verify_entries(&entries);
        assert_eq!(
            report.issues,
            vec![LedgerIssue::UnknownAction {
                position: 2,
                code: 42
            }]
        );
        assert_eq!(report.live, 1);
    }
}
