//! Optimistic-concurrency guard.

use crate::error::{ConcurrencyConflict, InvariantViolation};
use crate::types::Revision;

/// Stateless revision check applied once per mutation attempt.
///
/// The check must run inside the same write scope as the write it guards,
/// so check-then-write is atomic against other writers of the same key.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionGuard;

impl RevisionGuard {
    /// Fails unless `expected` is the stored revision. Never retries.
    ///
    /// # Errors
    ///
    /// [`ConcurrencyConflict`] when the revisions differ.
    pub fn check_for_update(
        expected: Revision,
        stored: Revision,
    ) -> Result<(), ConcurrencyConflict> {
        if expected == stored {
            Ok(())
        } else {
            Err(ConcurrencyConflict { expected, stored })
        }
    }

    /// The revision following `stored`.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation::RevisionOverflow`] instead of wrapping.
    pub fn next_revision(stored: Revision) -> Result<Revision, InvariantViolation> {
        stored
            .checked_next()
            .ok_or(InvariantViolation::RevisionOverflow { revision: stored })
    }
}
