//! In-memory persistence with an optional durable ledger journal.

use crate::audit::{decode_entry, encode_entry, AuditLedgerEntry};
use crate::config::JournalOptions;
use crate::entity::{Entity, Record};
use crate::error::StoreError;
use crate::key::{AuditKey, CompositeKey, ShapeKind};
use crate::persistence::{PersistenceCollaborator, WriteScope};
use crate::types::{AuditAction, Revision};
use ledgerkey_storage::{Journal, StorageBackend, StorageError};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

type IndexEntries = Vec<(&'static str, CompositeKey)>;

fn index_entries<R: Record>(entity: &Entity<R>) -> Result<IndexEntries, StoreError> {
    R::schema()
        .indexes
        .iter()
        .map(|index| -> Result<_, StoreError> {
            Ok((index.name, entity.index_key(index.name)?.detached()))
        })
        .collect()
}

struct Tables<R: Record> {
    /// Live rows with the index keys they are filed under.
    live: BTreeMap<CompositeKey, (Entity<R>, IndexEntries)>,
    /// Index name -> index key -> primary keys.
    indexes: BTreeMap<&'static str, BTreeMap<CompositeKey, BTreeSet<CompositeKey>>>,
    ledger: BTreeMap<AuditKey, AuditLedgerEntry<R>>,
    /// Primary key -> its audit keys.
    by_key: BTreeMap<CompositeKey, BTreeSet<AuditKey>>,
}

impl<R: Record> Tables<R> {
    fn new() -> Self {
        Self {
            live: BTreeMap::new(),
            indexes: BTreeMap::new(),
            ledger: BTreeMap::new(),
            by_key: BTreeMap::new(),
        }
    }

    fn put(&mut self, key: CompositeKey, entity: Entity<R>, entries: IndexEntries) {
        self.remove(&key);
        for (name, index_key) in &entries {
            self.indexes
                .entry(*name)
                .or_default()
                .entry(index_key.clone())
                .or_default()
                .insert(key.clone());
        }
        self.live.insert(key, (entity, entries));
    }

    fn remove(&mut self, key: &CompositeKey) {
        let Some((_, entries)) = self.live.remove(key) else {
            return;
        };
        for (name, index_key) in entries {
            if let Some(index) = self.indexes.get_mut(name) {
                if let Some(keys) = index.get_mut(&index_key) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.remove(&index_key);
                    }
                }
            }
        }
    }

    fn insert_entry(&mut self, entry: AuditLedgerEntry<R>) {
        let key = entry.key().clone();
        self.by_key
            .entry(key.natural.detached())
            .or_default()
            .insert(key.clone());
        self.ledger.insert(key, entry);
    }

    /// Applies a journaled entry: the ledger is the source of truth for the
    /// live rows.
    fn replay(&mut self, entry: AuditLedgerEntry<R>) -> Result<(), StoreError> {
        if self.ledger.contains_key(entry.key()) {
            return Err(StoreError::LedgerCollision {
                key: entry.key().to_string(),
            });
        }
        let natural = entry.key().natural.detached();
        match entry.action() {
            AuditAction::Create | AuditAction::Update => {
                let snapshot = entry.snapshot().clone();
                let entries = index_entries(&snapshot)?;
                self.put(natural, snapshot, entries);
            }
            AuditAction::Delete => self.remove(&natural),
        }
        self.insert_entry(entry);
        Ok(())
    }

    fn matching(&self, key: &CompositeKey) -> Vec<Entity<R>> {
        let ShapeKind::Index(name) = key.shape() else {
            return Vec::new();
        };
        self.indexes
            .get(name)
            .and_then(|index| index.get(key))
            .map(|keys| {
                keys.iter()
                    .filter_map(|pk| self.live.get(pk).map(|(entity, _)| entity.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Persistence held in memory, optionally backed by a ledger journal.
///
/// A single writer at a time: [`begin_write`](PersistenceCollaborator::begin_write)
/// takes an exclusive lock held until the scope is committed or dropped.
/// Readers never block on writers for longer than a commit's table update.
///
/// With a journal, each commit appends its ledger entries as one sealed
/// batch (and syncs it when configured) before the tables change, and
/// opening replays the sealed batches to rebuild the live rows. A commit
/// whose batch fails to land leaves neither the tables nor the journal
/// changed, and a commit cut off by a crash is dropped whole on replay.
pub struct MemoryPersistence<R: Record> {
    write_lock: Mutex<()>,
    tables: RwLock<Tables<R>>,
    journal: Option<Mutex<Journal>>,
}

impl<R: Record> MemoryPersistence<R> {
    /// Creates an empty, non-durable store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            tables: RwLock::new(Tables::new()),
            journal: None,
        }
    }

    /// Opens a store over a ledger journal, replaying whatever it holds.
    ///
    /// # Errors
    ///
    /// - a storage error if the journal cannot be read, is corrupt, or ends
    ///   in a torn frame while `repair_torn_tail` is off
    /// - a codec error if a frame is not an entry of family `R`
    /// - [`StoreError::LedgerCollision`] if an audit key repeats
    pub fn with_journal(
        backend: Box<dyn StorageBackend>,
        options: JournalOptions,
    ) -> Result<Self, StoreError> {
        let mut journal = Journal::new(backend, options.sync_on_commit);
        let frames = if options.repair_torn_tail {
            journal.recover()?
        } else {
            let scan = journal.scan()?;
            if scan.torn_bytes > 0 {
                return Err(StorageError::corrupted(
                    scan.valid_len,
                    format!("torn tail of {} bytes", scan.torn_bytes),
                )
                .into());
            }
            scan.frames
        };

        let mut tables = Tables::new();
        for frame in &frames {
            tables.replay(decode_entry::<R>(&frame.payload)?)?;
        }
        info!(
            family = R::schema().tag,
            entries = frames.len(),
            live = tables.live.len(),
            "ledger journal replayed"
        );

        Ok(Self {
            write_lock: Mutex::new(()),
            tables: RwLock::new(tables),
            journal: Some(Mutex::new(journal)),
        })
    }

    /// Whether commits are journaled.
    #[must_use]
    pub fn is_journaled(&self) -> bool {
        self.journal.is_some()
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.tables.read().live.len()
    }

    /// Number of ledger entries.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.tables.read().ledger.len()
    }
}

impl<R: Record> Default for MemoryPersistence<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> fmt::Debug for MemoryPersistence<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("MemoryPersistence")
            .field("family", &R::schema().tag)
            .field("live", &tables.live.len())
            .field("ledger", &tables.ledger.len())
            .field("journaled", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Record> PersistenceCollaborator<R> for MemoryPersistence<R> {
    type Scope<'a> = MemoryScope<'a, R>;

    fn begin_write(&self) -> Result<Self::Scope<'_>, StoreError> {
        Ok(MemoryScope {
            store: self,
            _guard: self.write_lock.lock(),
            pending: BTreeMap::new(),
            ledger: Vec::new(),
        })
    }

    fn read(&self, key: &CompositeKey) -> Result<Option<Entity<R>>, StoreError> {
        Ok(self
            .tables
            .read()
            .live
            .get(key)
            .map(|(entity, _)| entity.clone()))
    }

    fn read_by_index(&self, key: &CompositeKey) -> Result<Vec<Entity<R>>, StoreError> {
        Ok(self.tables.read().matching(key))
    }

    fn ledger_for_key(&self, key: &CompositeKey) -> Result<Vec<AuditLedgerEntry<R>>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .by_key
            .get(key)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| tables.ledger.get(k).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn ledger(&self) -> Result<Vec<AuditLedgerEntry<R>>, StoreError> {
        Ok(self.tables.read().ledger.values().cloned().collect())
    }

    fn read_history(&self, key: &AuditKey) -> Result<Option<AuditLedgerEntry<R>>, StoreError> {
        Ok(self.tables.read().ledger.get(key).cloned())
    }
}

/// Write scope of a [`MemoryPersistence`].
///
/// Holds the store's write lock. Pending changes are visible to this scope's
/// own reads and to nobody else until [`commit`](WriteScope::commit).
pub struct MemoryScope<'a, R: Record> {
    store: &'a MemoryPersistence<R>,
    _guard: MutexGuard<'a, ()>,
    /// Primary key -> staged row (`None` stages a removal).
    pending: BTreeMap<CompositeKey, Option<Entity<R>>>,
    ledger: Vec<AuditLedgerEntry<R>>,
}

impl<R: Record> WriteScope<R> for MemoryScope<'_, R> {
    fn read_for_update(
        &mut self,
        key: &CompositeKey,
    ) -> Result<Option<(Entity<R>, Revision)>, StoreError> {
        let entity = match self.pending.get(key) {
            Some(staged) => staged.clone(),
            None => self.store.read(key)?,
        };
        Ok(entity.map(|e| {
            let revision = e.revision();
            (e, revision)
        }))
    }

    fn read_by_index(&mut self, key: &CompositeKey) -> Result<Vec<Entity<R>>, StoreError> {
        let ShapeKind::Index(name) = key.shape() else {
            return Ok(Vec::new());
        };
        let mut rows: BTreeMap<CompositeKey, Entity<R>> = BTreeMap::new();
        for entity in self.store.read_by_index(key)? {
            let pk = entity.primary_key()?;
            if !self.pending.contains_key(&pk) {
                rows.insert(pk, entity);
            }
        }
        for (pk, staged) in &self.pending {
            if let Some(entity) = staged {
                if entity.index_key(name)? == *key {
                    rows.insert(pk.clone(), entity.clone());
                }
            }
        }
        Ok(rows.into_values().collect())
    }

    fn write(&mut self, entity: Entity<R>) -> Result<(), StoreError> {
        let key = entity.primary_key()?.detached();
        self.pending.insert(key, Some(entity));
        Ok(())
    }

    fn remove(&mut self, key: &CompositeKey) -> Result<(), StoreError> {
        self.pending.insert(key.detached(), None);
        Ok(())
    }

    fn append_ledger(&mut self, entry: AuditLedgerEntry<R>) -> Result<(), StoreError> {
        let collides = self.store.tables.read().ledger.contains_key(entry.key())
            || self.ledger.iter().any(|e| e.key() == entry.key());
        if collides {
            return Err(StoreError::LedgerCollision {
                key: entry.key().to_string(),
            });
        }
        self.ledger.push(entry);
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let mut rows = Vec::with_capacity(self.pending.len());
        for (key, staged) in self.pending {
            let staged = match staged {
                Some(entity) => {
                    let entries = index_entries(&entity)?;
                    Some((entity, entries))
                }
                None => None,
            };
            rows.push((key, staged));
        }

        if let Some(journal) = &self.store.journal {
            let payloads = self
                .ledger
                .iter()
                .map(encode_entry)
                .collect::<Result<Vec<_>, _>>()?;
            if !payloads.is_empty() {
                journal.lock().append_batch(&payloads)?;
            }
        }

        let entries = self.ledger.len();
        let mut tables = self.store.tables.write();
        for entry in self.ledger {
            tables.insert_entry(entry);
        }
        for (key, staged) in rows {
            match staged {
                Some((entity, index)) => tables.put(key, entity, index),
                None => tables.remove(&key),
            }
        }
        debug!(family = R::schema().tag, entries, "write scope committed");
        Ok(())
    }

    fn abort(self) {
        debug!(
            family = R::schema().tag,
            discarded = self.ledger.len(),
            "write scope aborted"
        );
    }
}

impl<R: Record> fmt::Debug for MemoryScope<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryScope")
            .field("pending", &self.pending.len())
            .field("ledger", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalOptions;
    use crate::test_support::{history_entry, live_node, Node};
    use ledgerkey_storage::{InMemoryBackend, StorageResult};

    /// Writes through to a shared buffer but never syncs.
    struct FailingSync(InMemoryBackend);

    impl StorageBackend for FailingSync {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.0.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.0.append(data)
        }

        fn size(&self) -> StorageResult<u64> {
            self.0.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            Err(std::io::Error::other("disk gone").into())
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.0.truncate(new_size)
        }
    }

    fn stage_create(scope: &mut MemoryScope<'_, Node>, entity: &Entity<Node>, stamp: u64) {
        scope.write(entity.clone()).unwrap();
        scope
            .append_ledger(history_entry(entity, AuditAction::Create, stamp))
            .unwrap();
    }

    fn create(store: &MemoryPersistence<Node>, entity: &Entity<Node>, stamp: u64) {
        let mut scope = store.begin_write().unwrap();
        scope.write(entity.clone()).unwrap();
        scope
            .append_ledger(history_entry(entity, AuditAction::Create, stamp))
            .unwrap();
        scope.commit().unwrap();
    }

    #[test]
    fn committed_rows_are_visible() {
        let store = MemoryPersistence::new();
        let entity = live_node("clusterA", "nodeX", Some("rack"), 1);
        create(&store, &entity, 1);

        let key = entity.primary_key().unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(entity.clone()));
        assert_eq!(store.ledger_for_key(&key).unwrap().len(), 1);
        let by_cluster = entity.index_key("ClusterIdx").unwrap();
        assert_eq!(store.read_by_index(&by_cluster).unwrap(), vec![entity]);
    }

    #[test]
    fn aborted_scope_leaves_nothing() {
        let store = MemoryPersistence::<Node>::new();
        let entity = live_node("clusterA", "nodeX", None, 1);
        let mut scope = store.begin_write().unwrap();
        scope.write(entity.clone()).unwrap();
        scope
            .append_ledger(history_entry(&entity, AuditAction::Create, 1))
            .unwrap();
        scope.abort();

        assert_eq!(store.live_count(), 0);
        assert_eq!(store.ledger_len(), 0);
    }

    #[test]
    fn scope_reads_its_own_writes() {
        let store = MemoryPersistence::<Node>::new();
        let entity = live_node("clusterA", "nodeX", Some("rack"), 1);
        let key = entity.primary_key().unwrap();
        let by_desc = entity.index_key("DescIdx").unwrap();

        let mut scope = store.begin_write().unwrap();
        scope.write(entity.clone()).unwrap();
        assert_eq!(
            scope.read_for_update(&key).unwrap().map(|(_, r)| r),
            Some(entity.revision())
        );
        assert_eq!(scope.read_by_index(&by_desc).unwrap().len(), 1);
        scope.remove(&key).unwrap();
        assert!(scope.read_for_update(&key).unwrap().is_none());
        assert!(scope.read_by_index(&by_desc).unwrap().is_empty());
        drop(scope);

        assert!(store.read(&key).unwrap().is_none());
    }

    #[test]
    fn ledger_collisions_are_rejected() {
        let store = MemoryPersistence::<Node>::new();
        let entity = live_node("clusterA", "nodeX", None, 1);
        create(&store, &entity, 1);

        let mut scope = store.begin_write().unwrap();
        let err = scope
            .append_ledger(history_entry(&entity, AuditAction::Create, 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::LedgerCollision { .. }));

        scope
            .append_ledger(history_entry(&entity, AuditAction::Create, 2))
            .unwrap();
        assert!(scope
            .append_ledger(history_entry(&entity, AuditAction::Create, 2))
            .is_err());
    }

    #[test]
    fn removal_unfiles_index_entries() {
        let store = MemoryPersistence::<Node>::new();
        let entity = live_node("clusterA", "nodeX", Some("rack"), 1);
        create(&store, &entity, 1);

        let mut scope = store.begin_write().unwrap();
        scope.remove(&entity.primary_key().unwrap()).unwrap();
        scope.commit().unwrap();

        let by_cluster = entity.index_key("ClusterIdx").unwrap();
        assert!(store.read_by_index(&by_cluster).unwrap().is_empty());
    }

    #[test]
    fn journal_replay_rebuilds_live_rows() {
        let backend = InMemoryBackend::new();
        let options = JournalOptions::default();
        let kept = live_node("clusterA", "nodeX", Some("rack"), 1);
        let gone = live_node("clusterA", "nodeY", None, 1);
        {
            let store =
                MemoryPersistence::<Node>::with_journal(Box::new(backend.clone()), options).unwrap();
            create(&store, &kept, 1);
            create(&store, &gone, 2);

            let mut scope = store.begin_write().unwrap();
            scope.remove(&gone.primary_key().unwrap()).unwrap();
            scope
                .append_ledger(history_entry(&gone, AuditAction::Delete, 3))
                .unwrap();
            scope.commit().unwrap();
        }

        let reopened = MemoryPersistence::<Node>::with_journal(Box::new(backend), options).unwrap();
        assert_eq!(reopened.ledger_len(), 3);
        assert_eq!(reopened.live_count(), 1);
        assert_eq!(
            reopened.read(&kept.primary_key().unwrap()).unwrap(),
            Some(kept)
        );
        assert!(reopened
            .read(&gone.primary_key().unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn torn_tail_fails_open_without_repair() {
        let backend = InMemoryBackend::new();
        {
            let store = MemoryPersistence::<Node>::with_journal(
                Box::new(backend.clone()),
                JournalOptions::default(),
            )
            .unwrap();
            create(&store, &live_node("clusterA", "nodeX", None, 1), 1);
        }
        let mut raw = backend.clone();
        raw.append(b"LKJ1\x10").unwrap();

        let strict = JournalOptions::default().repair_torn_tail(false);
        assert!(MemoryPersistence::<Node>::with_journal(Box::new(backend.clone()), strict).is_err());

        let repaired =
            MemoryPersistence::<Node>::with_journal(Box::new(backend), JournalOptions::default())
                .unwrap();
        assert_eq!(repaired.ledger_len(), 1);
    }

    #[test]
    fn commit_cut_off_by_a_crash_is_dropped_whole() {
        let backend = InMemoryBackend::new();
        let options = JournalOptions::default();
        let kept = live_node("clusterA", "nodeX", None, 1);
        let a = live_node("clusterA", "nodeY", None, 1);
        let b = live_node("clusterA", "nodeZ", None, 1);
        {
            let store =
                MemoryPersistence::<Node>::with_journal(Box::new(backend.clone()), options).unwrap();
            create(&store, &kept, 1);
            let mut scope = store.begin_write().unwrap();
            stage_create(&mut scope, &a, 2);
            stage_create(&mut scope, &b, 3);
            scope.commit().unwrap();
            assert_eq!(store.live_count(), 3);
        }
        let mut raw = backend.clone();
        raw.truncate(backend.data().len() as u64 - 1).unwrap();

        let reopened =
            MemoryPersistence::<Node>::with_journal(Box::new(backend.clone()), options).unwrap();
        assert_eq!(reopened.live_count(), 1);
        assert_eq!(reopened.ledger_len(), 1);
        assert!(reopened.read(&a.primary_key().unwrap()).unwrap().is_none());
        assert!(reopened.read(&b.primary_key().unwrap()).unwrap().is_none());
    }

    #[test]
    fn failed_commit_is_not_replayed() {
        let backend = InMemoryBackend::new();
        let entity = live_node("clusterA", "nodeX", None, 1);
        {
            let store = MemoryPersistence::<Node>::with_journal(
                Box::new(FailingSync(backend.clone())),
                JournalOptions::default(),
            )
            .unwrap();
            let mut scope = store.begin_write().unwrap();
            stage_create(&mut scope, &entity, 1);
            assert!(matches!(scope.commit(), Err(StoreError::Storage(_))));
            assert!(store.read(&entity.primary_key().unwrap()).unwrap().is_none());

            // The rollback could not be synced, so later commits are refused.
            let mut scope = store.begin_write().unwrap();
            stage_create(&mut scope, &entity, 2);
            assert!(scope.commit().is_err());
            assert_eq!(store.live_count(), 0);
        }

        let reopened =
            MemoryPersistence::<Node>::with_journal(Box::new(backend), JournalOptions::default())
                .unwrap();
        assert_eq!(reopened.live_count(), 0);
        assert_eq!(reopened.ledger_len(), 0);
    }

    #[test]
    fn replayed_duplicates_are_collisions() {
        let entity = live_node("clusterA", "nodeX", None, 1);
        let payload = encode_entry(&history_entry(&entity, AuditAction::Create, 1)).unwrap();
        let bytes = {
            let backend = InMemoryBackend::new();
            let mut journal = Journal::new(Box::new(backend.clone()), false);
            journal.append(&payload).unwrap();
            journal.append(&payload).unwrap();
            backend.data()
        };
        let err = MemoryPersistence::<Node>::with_journal(
            Box::new(InMemoryBackend::with_data(bytes)),
            JournalOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::LedgerCollision { .. }));
    }
}
