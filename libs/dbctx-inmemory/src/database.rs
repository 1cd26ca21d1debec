//! Named in-memory databases.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dbctx::Record;
use parking_lot::RwLock;

type Table = BTreeMap<String, serde_json::Value>;

/// One in-memory database: entity sets keyed by name, records keyed by their key.
#[derive(Default)]
pub struct InMemoryDatabase {
    name: String,
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryDatabase {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create `entity_set` if missing; `true` when it was created.
    #[must_use]
    pub fn ensure_table(&self, entity_set: &str) -> bool {
        let mut tables = self.tables.write();
        if tables.contains_key(entity_set) {
            return false;
        }
        tables.insert(entity_set.to_owned(), Table::new());
        true
    }

    /// Records of `entity_set` ordered by key. A missing set reads as empty.
    #[must_use]
    pub fn records(&self, entity_set: &str) -> Vec<Record> {
        self.tables
            .read()
            .get(entity_set)
            .map(|rows| {
                rows.iter()
                    .map(|(key, payload)| Record::new(key.clone(), payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert or replace by key, creating the set on first write.
    #[must_use]
    pub fn upsert(&self, entity_set: &str, records: &[Record]) -> usize {
        let mut tables = self.tables.write();
        let rows = tables.entry(entity_set.to_owned()).or_default();
        for record in records {
            rows.insert(record.key.clone(), record.payload.clone());
        }
        records.len()
    }

    pub fn clear(&self) {
        self.tables.write().clear();
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }
}

impl fmt::Debug for InMemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDatabase")
            .field("name", &self.name)
            .field("tables", &self.table_count())
            .finish_non_exhaustive()
    }
}

static DEFAULT_ROOT: LazyLock<Arc<InMemoryDatabaseRoot>> =
    LazyLock::new(|| Arc::new(InMemoryDatabaseRoot::new()));

/// Holder of named databases. Contexts that name the same database through the same root
/// see the same data.
#[derive(Debug, Default)]
pub struct InMemoryDatabaseRoot {
    databases: DashMap<String, Arc<InMemoryDatabase>>,
}

impl InMemoryDatabaseRoot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide root used when neither the extension nor the service collection
    /// supplies one.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&DEFAULT_ROOT)
    }

    /// The database called `name`, created empty on first use.
    #[must_use]
    pub fn database(&self, name: &str) -> Arc<InMemoryDatabase> {
        Arc::clone(
            self.databases
                .entry(name.to_owned())
                .or_insert_with(|| {
                    tracing::debug!(database = name, "Created in-memory database");
                    Arc::new(InMemoryDatabase::new(name))
                })
                .value(),
        )
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Drop the named database; contexts still holding it keep their copy.
    #[must_use]
    pub fn remove(&self, name: &str) -> Option<Arc<InMemoryDatabase>> {
        self.databases.remove(name).map(|(_, db)| db)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}
