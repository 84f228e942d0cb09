//! The versioned entity store.

use crate::audit::AuditLedgerEntry;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::entity::{Entity, EntityOwner, Record};
use crate::error::{
    CreateError, DeleteError, InvariantViolation, KeyError, PrepareError, ReadError,
    ResolutionError, StoreError, UpdateError,
};
use crate::field::{FieldKind, FieldRole, FieldValue, KeyResolver, OwnerHandle, ScalarValue};
use crate::key::{AuditKey, CompositeKey, ShapeKind};
use crate::persistence::{MemoryPersistence, PersistenceCollaborator, WriteScope};
use crate::revision::RevisionGuard;
use crate::types::{ActorId, AuditAction, Revision, SessionId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn fatal(violation: InvariantViolation) -> InvariantViolation {
    error!(%violation, "invariant violation; aborting write");
    violation
}

/// Create/update/delete with optimistic revisions and an audit ledger.
///
/// Every mutation runs inside a write scope of the persistence collaborator:
/// references are resolved, the revision is checked, the new state is
/// written and exactly one [`AuditLedgerEntry`] is appended, all before the
/// scope commits. Any failure aborts the scope so nothing lands.
///
/// Conflicts are never retried here. A [`ConcurrencyConflict`] goes back to
/// the caller, who decides whether to re-read and try again.
///
/// [`ConcurrencyConflict`]: crate::ConcurrencyConflict
pub struct VersionedEntityStore<R: Record, P: PersistenceCollaborator<R>> {
    persistence: Arc<P>,
    resolver: Arc<dyn KeyResolver>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    _family: PhantomData<fn() -> R>,
}

/// A store over [`MemoryPersistence`].
pub type MemoryStore<R> = VersionedEntityStore<R, MemoryPersistence<R>>;

impl<R: Record> VersionedEntityStore<R, MemoryPersistence<R>> {
    /// A store over fresh, non-durable in-memory persistence.
    #[must_use]
    pub fn in_memory(resolver: Arc<dyn KeyResolver>, config: StoreConfig) -> Self {
        Self::new(Arc::new(MemoryPersistence::new()), resolver, config)
    }
}

impl<R: Record, P: PersistenceCollaborator<R>> VersionedEntityStore<R, P> {
    /// Creates a store using the system clock.
    #[must_use]
    pub fn new(persistence: Arc<P>, resolver: Arc<dyn KeyResolver>, config: StoreConfig) -> Self {
        Self {
            persistence,
            resolver,
            clock: Arc::new(SystemClock::new()),
            config,
            _family: PhantomData,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A store sharing this one's persistence, resolver and clock, writing
    /// under another audit session and actor.
    #[must_use]
    pub fn for_session(&self, session: SessionId, actor: ActorId) -> Self {
        Self {
            persistence: Arc::clone(&self.persistence),
            resolver: Arc::clone(&self.resolver),
            clock: Arc::clone(&self.clock),
            config: self.config.clone().session(session).actor(actor),
            _family: PhantomData,
        }
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The persistence collaborator.
    #[must_use]
    pub fn persistence(&self) -> &Arc<P> {
        &self.persistence
    }

    /// Runs `f` in a write scope: commits on `Ok`, aborts on `Err`.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a [`StoreError`] from opening or committing
    /// the scope.
    pub fn write_transaction<'s, T, E, F>(&'s self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut P::Scope<'s>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut scope = self.persistence.begin_write()?;
        match f(&mut scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                scope.abort();
                Err(err)
            }
        }
    }

    /// Creates an entity, or returns the live one already at its primary key.
    ///
    /// # Errors
    ///
    /// - [`CreateError::MissingRequiredField`] for a null non-nullable field
    /// - [`CreateError::Field`] for a bound violation
    /// - [`CreateError::Resolution`] for an unknown referenced owner
    /// - [`CreateError::UniqueViolation`] for a taken unique index key
    /// - [`CreateError::Invariant`] for a ledger collision (fatal)
    /// - [`CreateError::StoreUnavailable`] if persistence fails
    pub fn create(&self, record: R) -> Result<Entity<R>, CreateError> {
        self.write_transaction(|scope| self.create_in(scope, record))
    }

    /// [`create`](Self::create) inside a caller-owned scope.
    ///
    /// # Errors
    ///
    /// As for [`create`](Self::create).
    pub fn create_in<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        record: R,
    ) -> Result<Entity<R>, CreateError> {
        let family = R::schema().tag;
        let record = self.prepare(record)?;
        let key = record.primary_key()?;

        if let Some((existing, revision)) = scope.read_for_update(&key)? {
            debug!(family, %key, %revision, "create found live entity");
            return Ok(existing);
        }
        if let Some((index, key)) = self.unique_conflict(scope, &record, &key)? {
            return Err(CreateError::UniqueViolation { index, key });
        }

        let now = self.clock.now();
        let entity = Entity::created(record, self.config.actor, now);
        let entry = AuditLedgerEntry::record(
            AuditAction::Create,
            None,
            Some(&entity),
            self.config.session,
            self.config.cluster,
            now,
        )
        .map_err(fatal)?;
        scope.write(entity.clone())?;
        self.append(scope, entry)?;

        info!(family, %key, "entity created");
        Ok(entity)
    }

    /// Applies the mutable fields of `record` to the live entity at its
    /// primary key, guarded by `expected`.
    ///
    /// Fixed fields and creation attribution are never changed.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NotFound`] if no entity is live at the key
    /// - [`UpdateError::ConcurrencyConflict`] if `expected` is stale; the
    ///   stored entity is unchanged
    /// - [`UpdateError::UniqueViolation`] for a taken unique index key
    /// - [`UpdateError::Invariant`] for revision overflow or a ledger
    ///   collision (fatal)
    /// - validation, resolution and store failures as for create
    pub fn update(&self, record: R, expected: Revision) -> Result<Entity<R>, UpdateError> {
        self.write_transaction(|scope| self.update_in(scope, record, expected))
    }

    /// [`update`](Self::update) inside a caller-owned scope.
    ///
    /// # Errors
    ///
    /// As for [`update`](Self::update).
    pub fn update_in<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        record: R,
        expected: Revision,
    ) -> Result<Entity<R>, UpdateError> {
        let family = R::schema().tag;
        let record = self.prepare(record)?;
        let key = record.primary_key()?;

        let Some((stored, revision)) = scope.read_for_update(&key)? else {
            return Err(UpdateError::NotFound {
                key: key.to_string(),
            });
        };
        if let Err(conflict) = RevisionGuard::check_for_update(expected, revision) {
            warn!(family, %key, expected = %conflict.expected, stored = %conflict.stored, "stale revision");
            return Err(conflict.into());
        }
        let next = RevisionGuard::next_revision(revision).map_err(fatal)?;

        // Key fields are equal by value; copying them carries the resolved owners.
        let mut merged = stored.record().clone();
        let carried = R::schema()
            .fields
            .iter()
            .filter(|s| matches!(s.role, FieldRole::Key | FieldRole::Mutable));
        for spec in carried {
            merged.set_field(spec.id, record.field(spec.id))?;
        }
        if let Some((index, key)) = self.unique_conflict(scope, &merged, &key)? {
            return Err(UpdateError::UniqueViolation { index, key });
        }

        let now = self.clock.now();
        let after = stored.advanced(merged, next, self.config.actor, now);
        let entry = AuditLedgerEntry::record(
            AuditAction::Update,
            Some(&stored),
            Some(&after),
            self.config.session,
            self.config.cluster,
            now,
        )
        .map_err(fatal)?;
        scope.write(after.clone())?;
        self.append(scope, entry)?;

        info!(family, %key, revision = %next, "entity updated");
        Ok(after)
    }

    /// Removes the live entity at `key`, returning its final state. A missing
    /// key is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DeleteError::Key`] if `key` is not a primary key of this family
    /// - [`DeleteError::Resolution`] for an unknown referenced owner
    /// - [`DeleteError::Invariant`] for a ledger collision (fatal)
    /// - [`DeleteError::StoreUnavailable`] if persistence fails
    pub fn delete(&self, key: &CompositeKey) -> Result<Option<Entity<R>>, DeleteError> {
        self.write_transaction(|scope| self.delete_in(scope, key))
    }

    /// [`delete`](Self::delete) inside a caller-owned scope.
    ///
    /// # Errors
    ///
    /// As for [`delete`](Self::delete).
    pub fn delete_in<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        key: &CompositeKey,
    ) -> Result<Option<Entity<R>>, DeleteError> {
        let key = self.resolved_key::<DeleteError>(key)?;
        let Some((stored, _)) = scope.read_for_update(&key)? else {
            debug!(family = R::schema().tag, %key, "delete of missing entity ignored");
            return Ok(None);
        };
        self.remove_in(scope, &key, stored).map(Some)
    }

    /// Removes the live entity at `key` only if it is at `expected`.
    ///
    /// # Errors
    ///
    /// [`DeleteError::NotFound`] if nothing is live at `key`,
    /// [`DeleteError::ConcurrencyConflict`] if `expected` is stale, otherwise
    /// as for [`delete`](Self::delete).
    pub fn delete_at_revision(
        &self,
        key: &CompositeKey,
        expected: Revision,
    ) -> Result<Entity<R>, DeleteError> {
        self.write_transaction(|scope| self.delete_at_revision_in(scope, key, expected))
    }

    /// [`delete_at_revision`](Self::delete_at_revision) inside a caller-owned
    /// scope.
    ///
    /// # Errors
    ///
    /// As for [`delete_at_revision`](Self::delete_at_revision).
    pub fn delete_at_revision_in<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        key: &CompositeKey,
        expected: Revision,
    ) -> Result<Entity<R>, DeleteError> {
        let key = self.resolved_key::<DeleteError>(key)?;
        let Some((stored, revision)) = scope.read_for_update(&key)? else {
            return Err(DeleteError::NotFound {
                key: key.to_string(),
            });
        };
        if let Err(conflict) = RevisionGuard::check_for_update(expected, revision) {
            warn!(family = R::schema().tag, %key, expected = %conflict.expected, stored = %conflict.stored, "stale revision");
            return Err(conflict.into());
        }
        self.remove_in(scope, &key, stored)
    }

    /// The live entity at a primary key.
    ///
    /// Reads do not consult the resolver. Entities replayed from a journal
    /// carry unresolved references, and [`equals`](crate::equals) on them
    /// reports
    /// [`CompareError::UnresolvedReference`](crate::CompareError::UnresolvedReference)
    /// until they are resolved; use [`find_resolved`](Self::find_resolved)
    /// for an entity ready to compare.
    ///
    /// # Errors
    ///
    /// [`ReadError::Key`] for a key of another family or shape,
    /// [`ReadError::StoreUnavailable`] if persistence fails.
    pub fn find(&self, key: &CompositeKey) -> Result<Option<Entity<R>>, ReadError> {
        Self::expect_shape(key, ShapeKind::PrimaryKey)?;
        Ok(self.persistence.read(key)?)
    }

    /// [`find`](Self::find) with every reference resolved.
    ///
    /// # Errors
    ///
    /// As for [`find`](Self::find), plus [`ReadError::Key`] if a referenced
    /// owner no longer resolves.
    pub fn find_resolved(&self, key: &CompositeKey) -> Result<Option<Entity<R>>, ReadError> {
        self.find(key)?
            .map(|mut entity| {
                entity.resolve_references(self.resolver.as_ref())?;
                Ok(entity)
            })
            .transpose()
    }

    /// The first live entity, by primary key, matching an index key.
    ///
    /// # Errors
    ///
    /// As for [`list_by_index`](Self::list_by_index).
    pub fn find_by_index(&self, key: &CompositeKey) -> Result<Option<Entity<R>>, ReadError> {
        Ok(self.list_by_index(key)?.into_iter().next())
    }

    /// Every live entity matching an index key, ordered by primary key.
    ///
    /// # Errors
    ///
    /// [`ReadError::Key`] for a key that is not an index key of this family,
    /// [`ReadError::StoreUnavailable`] if persistence fails.
    pub fn list_by_index(&self, key: &CompositeKey) -> Result<Vec<Entity<R>>, ReadError> {
        if !matches!(key.shape(), ShapeKind::Index(_)) {
            return Err(KeyError::ShapeMismatch {
                expected: format!("{} index key", R::schema().tag),
                found: format!("{} {}", key.schema().tag, key.shape()),
            }
            .into());
        }
        Self::expect_shape(key, key.shape())?;
        Ok(self.persistence.read_by_index(key)?)
    }

    /// Ledger entries for one primary key in audit key order.
    ///
    /// Like [`find`](Self::find), entries replayed from a journal carry
    /// unresolved references; see
    /// [`list_history_for_key_resolved`](Self::list_history_for_key_resolved).
    ///
    /// # Errors
    ///
    /// As for [`find`](Self::find).
    pub fn list_history_for_key(
        &self,
        key: &CompositeKey,
    ) -> Result<Vec<AuditLedgerEntry<R>>, ReadError> {
        Self::expect_shape(key, ShapeKind::PrimaryKey)?;
        Ok(self.persistence.ledger_for_key(key)?)
    }

    /// [`list_history_for_key`](Self::list_history_for_key) with every
    /// snapshot and audit key resolved.
    ///
    /// # Errors
    ///
    /// As for [`find_resolved`](Self::find_resolved).
    pub fn list_history_for_key_resolved(
        &self,
        key: &CompositeKey,
    ) -> Result<Vec<AuditLedgerEntry<R>>, ReadError> {
        let mut history = self.list_history_for_key(key)?;
        for entry in &mut history {
            entry.resolve_references(self.resolver.as_ref())?;
        }
        Ok(history)
    }

    /// The whole ledger of this family in audit key order.
    ///
    /// # Errors
    ///
    /// [`ReadError::StoreUnavailable`] if persistence fails.
    pub fn list_history(&self) -> Result<Vec<AuditLedgerEntry<R>>, ReadError> {
        Ok(self.persistence.ledger()?)
    }

    /// One ledger entry by audit key.
    ///
    /// # Errors
    ///
    /// As for [`find`](Self::find).
    pub fn find_history(&self, key: &AuditKey) -> Result<Option<AuditLedgerEntry<R>>, ReadError> {
        Self::expect_shape(&key.natural, ShapeKind::PrimaryKey)?;
        Ok(self.persistence.read_history(key)?)
    }

    fn expect_shape(key: &CompositeKey, shape: ShapeKind) -> Result<(), KeyError> {
        let tag = R::schema().tag;
        if key.schema().tag == tag && key.shape() == shape {
            Ok(())
        } else {
            Err(KeyError::ShapeMismatch {
                expected: format!("{tag} {shape}"),
                found: format!("{} {}", key.schema().tag, key.shape()),
            })
        }
    }

    fn resolved_key<E>(&self, key: &CompositeKey) -> Result<CompositeKey, E>
    where
        E: From<KeyError> + From<ResolutionError>,
    {
        Self::expect_shape(key, ShapeKind::PrimaryKey)?;
        let mut key = key.clone();
        key.resolve(self.resolver.as_ref())?;
        Ok(key)
    }

    /// Required-field check, validation and reference resolution.
    fn prepare(&self, mut record: R) -> Result<R, PrepareError> {
        let missing = R::schema()
            .fields
            .iter()
            .find(|spec| !spec.nullable && record.field(spec.id).is_null());
        if let Some(spec) = missing {
            return Err(PrepareError::Missing(spec.name));
        }
        record.validate()?;
        record.resolve_references(self.resolver.as_ref())?;
        Ok(record)
    }

    /// First unique index whose key `record` would share with another live
    /// entity. Keys with a null component never collide.
    fn unique_conflict<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        record: &R,
        own: &CompositeKey,
    ) -> Result<Option<(&'static str, String)>, StoreError> {
        if !self.config.enforce_unique_indexes {
            return Ok(None);
        }
        for index in R::schema().indexes.iter().filter(|i| i.unique) {
            let key = record.index_key(index.name)?;
            if key.has_null() {
                continue;
            }
            for other in scope.read_by_index(&key)? {
                if other.primary_key()? != *own {
                    debug!(family = R::schema().tag, index = index.name, %key, "unique index taken");
                    return Ok(Some((index.name, key.to_string())));
                }
            }
        }
        Ok(None)
    }

    fn remove_in<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        key: &CompositeKey,
        stored: Entity<R>,
    ) -> Result<Entity<R>, DeleteError> {
        let entry = AuditLedgerEntry::record(
            AuditAction::Delete,
            Some(&stored),
            None,
            self.config.session,
            self.config.cluster,
            self.clock.now(),
        )
        .map_err(fatal)?;
        scope.remove(key)?;
        self.append(scope, entry)?;

        info!(family = R::schema().tag, %key, revision = %stored.revision(), "entity deleted");
        Ok(stored)
    }

    fn append<S: WriteScope<R>>(
        &self,
        scope: &mut S,
        entry: AuditLedgerEntry<R>,
    ) -> Result<(), StoreError> {
        scope.append_ledger(entry).inspect_err(|err| {
            if let StoreError::LedgerCollision { key } = err {
                error!(family = R::schema().tag, %key, "audit ledger collision; aborting write");
            }
        })
    }
}

impl<R: Record, P: PersistenceCollaborator<R>> Clone for VersionedEntityStore<R, P> {
    fn clone(&self) -> Self {
        Self {
            persistence: Arc::clone(&self.persistence),
            resolver: Arc::clone(&self.resolver),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            _family: PhantomData,
        }
    }
}

impl<R: Record, P: PersistenceCollaborator<R>> fmt::Debug for VersionedEntityStore<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedEntityStore")
            .field("family", &R::schema().tag)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A store resolves references into its own family when the family has a
/// single-field primary key.
impl<R: Record, P: PersistenceCollaborator<R>> KeyResolver for VersionedEntityStore<R, P> {
    fn resolve(&self, target: &str, id: &ScalarValue) -> Option<OwnerHandle> {
        let schema = R::schema();
        let [field] = schema.primary_key else {
            return None;
        };
        if target != schema.tag {
            return None;
        }
        let value = match schema.field(*field)?.kind {
            FieldKind::Scalar(_) => FieldValue::Scalar(id.clone()),
            FieldKind::Reference { target, .. } => FieldValue::reference(target, id.clone()),
        };
        let key = CompositeKey::primary(schema, vec![value]).ok()?;
        let entity = self.persistence.read(&key).ok()??;
        Some(Arc::new(EntityOwner::new(id.clone(), entity)))
    }
}
