//! Store and journal configuration.

use crate::types::{ActorId, ClusterId, SessionId};

/// Configuration for a [`VersionedEntityStore`](crate::VersionedEntityStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Cluster written into every audit key.
    pub cluster: ClusterId,

    /// Audit session written into every audit key.
    pub session: SessionId,

    /// User recorded as created-by / updated-by.
    pub actor: ActorId,

    /// Whether unique secondary indexes are checked on create and update.
    pub enforce_unique_indexes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterId::default(),
            session: SessionId::new(),
            actor: ActorId::system(),
            enforce_unique_indexes: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with a fresh session and the system actor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the audit cluster.
    #[must_use]
    pub const fn cluster(mut self, cluster: ClusterId) -> Self {
        self.cluster = cluster;
        self
    }

    /// Sets the audit session.
    #[must_use]
    pub const fn session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub const fn actor(mut self, actor: ActorId) -> Self {
        self.actor = actor;
        self
    }

    /// Sets whether unique indexes are enforced.
    #[must_use]
    pub const fn enforce_unique_indexes(mut self, value: bool) -> Self {
        self.enforce_unique_indexes = value;
        self
    }
}

/// Options for a journaled [`MemoryPersistence`](crate::MemoryPersistence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalOptions {
    /// Whether ledger frames are synced before a commit returns.
    pub sync_on_commit: bool,

    /// Whether a torn final frame is truncated on open. When unset, a torn
    /// tail fails the open.
    pub repair_torn_tail: bool,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            repair_torn_tail: true,
        }
    }
}

impl JournalOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to repair a torn tail on open.
    #[must_use]
    pub const fn repair_torn_tail(mut self, value: bool) -> Self {
        self.repair_torn_tail = value;
        self
    }
}
