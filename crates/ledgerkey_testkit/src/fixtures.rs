//! Fixture entity families and store helpers.
//!
//! The families mirror a small cluster-management model: clusters own host
//! nodes through a reference key, tenants and ISO countries have scalar
//! keys and a couple of secondary indexes each.

use ledgerkey_core::{
    FieldError, FieldId, FieldSpec, FieldValue, IndexSpec, JournalOptions, KeyResolver,
    MapResolver, MemoryPersistence, MemoryStore, Record, ReferenceKeyField, ScalarKind, Schema,
    StoreConfig, StoreError, VersionedEntityStore,
};
use ledgerkey_storage::FileBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn unknown(schema: &Schema, id: FieldId) -> FieldError {
    FieldError::UnknownField {
        family: schema.tag,
        field: id,
    }
}

// Cluster

static CLUSTER_FIELDS: [FieldSpec; 2] = [
    FieldSpec::text(0, "name", 64).key(),
    FieldSpec::text(1, "description", 50).mutable().nullable(),
];

/// Schema of [`Cluster`].
pub static CLUSTER: Schema = Schema::new("Cluster", &CLUSTER_FIELDS, &[FieldId(0)]);

/// A named cluster of hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cluster {
    /// Primary key.
    pub name: Option<String>,
    /// Free text.
    pub description: Option<String>,
}

impl Cluster {
    /// A cluster without description.
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl Record for Cluster {
    fn schema() -> &'static Schema {
        &CLUSTER
    }

    fn blank() -> Self {
        Self::default()
    }

    fn field(&self, id: FieldId) -> FieldValue {
        match id.0 {
            0 => FieldValue::scalar_or_null(self.name.clone()),
            1 => FieldValue::scalar_or_null(self.description.clone()),
            _ => FieldValue::Null,
        }
    }

    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
        match id.0 {
            0 => self.name = value.into_text("name")?,
            1 => self.description = value.into_text("description")?,
            _ => return Err(unknown(&CLUSTER, id)),
        }
        Ok(())
    }
}

// Tenant

static TENANT_FIELDS: [FieldSpec; 2] = [
    FieldSpec::int64(0, "id").key(),
    FieldSpec::text(1, "tenant_name", 64).mutable(),
];

static TENANT_INDEXES: [IndexSpec; 1] = [IndexSpec::unique("TenantNameIdx", &[FieldId(1)])];

/// Schema of [`Tenant`].
pub static TENANT: Schema =
    Schema::new("Tenant", &TENANT_FIELDS, &[FieldId(0)]).with_indexes(&TENANT_INDEXES);

/// A tenant with a unique name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tenant {
    /// Primary key.
    pub id: Option<i64>,
    /// Unique display name.
    pub tenant_name: Option<String>,
}

impl Tenant {
    /// A tenant.
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            tenant_name: Some(name.to_string()),
        }
    }
}

impl Record for Tenant {
    fn schema() -> &'static Schema {
        &TENANT
    }

    fn blank() -> Self {
        Self::default()
    }

    fn field(&self, id: FieldId) -> FieldValue {
        match id.0 {
            0 => FieldValue::scalar_or_null(self.id),
            1 => FieldValue::scalar_or_null(self.tenant_name.clone()),
            _ => FieldValue::Null,
        }
    }

    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
        match id.0 {
            0 => self.id = value.into_i64("id")?,
            1 => self.tenant_name = value.into_text("tenant_name")?,
            _ => return Err(unknown(&TENANT, id)),
        }
        Ok(())
    }
}

// HostNode

static HOST_FIELDS: [FieldSpec; 4] = [
    FieldSpec::reference(0, "cluster", "Cluster", ScalarKind::Text).key(),
    FieldSpec::text(1, "host_name", 192).key(),
    FieldSpec::text(2, "description", 50).mutable().nullable(),
    FieldSpec::int32(3, "rank").range(0, 1_000).mutable().nullable(),
];

static HOST_INDEXES: [IndexSpec; 3] = [
    IndexSpec::new("ClusterIdx", &[FieldId(0)]),
    IndexSpec::unique("DescIdx", &[FieldId(0), FieldId(2)]),
    IndexSpec::new("RankIdx", &[FieldId(3)]),
];

/// Schema of [`HostNode`].
pub static HOST_NODE: Schema =
    Schema::new("HostNode", &HOST_FIELDS, &[FieldId(0), FieldId(1)]).with_indexes(&HOST_INDEXES);

/// A host, keyed by its cluster and host name.
#[derive(Debug, Clone, Default)]
pub struct HostNode {
    /// Owning cluster.
    pub cluster: Option<ReferenceKeyField>,
    /// Host name, unique within the cluster.
    pub host_name: Option<String>,
    /// Free text, unique within the cluster when set.
    pub description: Option<String>,
    /// Scheduling rank.
    pub rank: Option<i32>,
}

impl HostNode {
    /// A host with an unresolved cluster reference.
    pub fn new(cluster: &str, host: &str) -> Self {
        Self {
            cluster: Some(ReferenceKeyField::unresolved("Cluster", cluster)),
            host_name: Some(host.to_string()),
            description: None,
            rank: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Sets the rank.
    #[must_use]
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = Some(rank);
        self
    }
}

impl Record for HostNode {
    fn schema() -> &'static Schema {
        &HOST_NODE
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
            _ => FieldValue::Null,
        }
    }

    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
        match id.0 {
            0 => self.cluster = value.into_reference("cluster")?,
            1 => self.host_name = value.into_text("host_name")?,
            2 => self.description = value.into_text("description")?,
            3 => self.rank = value.into_i32("rank")?,
            _ => return Err(unknown(&HOST_NODE, id)),
        }
        Ok(())
    }
}

// IsoCtry

static ISO_CTRY_FIELDS: [FieldSpec; 3] = [
    FieldSpec::int16(0, "id").key(),
    FieldSpec::text(1, "iso_code", 2).mutable(),
    FieldSpec::text(2, "name", 64).mutable(),
];

static ISO_CTRY_INDEXES: [IndexSpec; 2] = [
    IndexSpec::unique("IsoCodeIdx", &[FieldId(1)]),
    IndexSpec::unique("NameIdx", &[FieldId(2)]),
];

/// Schema of [`IsoCtry`].
pub static ISO_CTRY: Schema =
    Schema::new("IsoCtry", &ISO_CTRY_FIELDS, &[FieldId(0)]).with_indexes(&ISO_CTRY_INDEXES);

/// An ISO 3166 country.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsoCtry {
    /// Primary key.
    pub id: Option<i16>,
    /// Two-letter code.
    pub iso_code: Option<String>,
    /// English name.
    pub name: Option<String>,
}

impl IsoCtry {
    /// A country.
    pub fn new(id: i16, iso_code: &str, name: &str) -> Self {
        Self {
            id: Some(id),
            iso_code: Some(iso_code.to_string()),
            name: Some(name.to_string()),
        }
    }
}

impl Record for IsoCtry {
    fn schema() -> &'static Schema {
        &ISO_CTRY
    }

    fn blank() -> Self {
        Self::default()
    }

    fn field(&self, id: FieldId) -> FieldValue {
        match id.0 {
            0 => FieldValue::scalar_or_null(self.id),
            1 => FieldValue::scalar_or_null(self.iso_code.clone()),
            2 => FieldValue::scalar_or_null(self.name.clone()),
            _ => FieldValue::Null,
        }
    }

    fn set_field(&mut self, id: FieldId, value: FieldValue) -> Result<(), FieldError> {
        match id.0 {
            0 => self.id = value.into_i16("id")?,
            1 => self.iso_code = value.into_text("iso_code")?,
            2 => self.name = value.into_text("name")?,
            _ => return Err(unknown(&ISO_CTRY, id)),
        }
        Ok(())
    }
}

// Stores

/// An in-memory store for a family without outgoing references.
pub fn standalone_store<R: Record>() -> MemoryStore<R> {
    VersionedEntityStore::in_memory(Arc::new(MapResolver::new()), StoreConfig::new())
}

/// An in-memory cluster store.
pub fn cluster_store() -> MemoryStore<Cluster> {
    standalone_store()
}

/// An in-memory host store resolving clusters against `clusters`.
pub fn host_store(clusters: &MemoryStore<Cluster>) -> MemoryStore<HostNode> {
    let resolver: Arc<dyn KeyResolver> = Arc::new(clusters.clone());
    VersionedEntityStore::in_memory(resolver, StoreConfig::new())
}

/// A journal file in a temporary directory, removed on drop.
pub struct TestJournal {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestJournal {
    /// Creates an empty journal location.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("ledger").join("hosts.lkj");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// The journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens journaled persistence over the file. Only one instance may be
    /// open at a time.
    ///
    /// # Errors
    ///
    /// See [`MemoryPersistence::with_journal`].
    pub fn open<R: Record>(&self, options: JournalOptions) -> Result<MemoryPersistence<R>, StoreError> {
        let backend = FileBackend::open_with_create_dirs(&self.path)?;
        MemoryPersistence::with_journal(Box::new(backend), options)
    }
}

impl Default for TestJournal {
    fn default() -> Self {
        Self::new()
    }
}
