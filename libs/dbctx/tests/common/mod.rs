#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

//! Test doubles for the store and connection contracts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dbctx::{
    ConnectionFactory, DataStore, ExtensionInfo, OptionsExtension, ProviderExtension, Record,
    RelationalConnection, ServiceRegistry, StoreError, StoreLease,
};
use parking_lot::Mutex;

type Tables = HashMap<String, BTreeMap<String, serde_json::Value>>;

/// Relational connection backed by a map, counting opens and closes.
#[derive(Debug, Default)]
pub struct FakeConnection {
    connection_string: String,
    open: AtomicBool,
    fail_open: bool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    tables: Arc<Mutex<Tables>>,
}

impl FakeConnection {
    pub fn new(connection_string: &str) -> Arc<Self> {
        Arc::new(Self {
            connection_string: connection_string.to_owned(),
            ..Self::default()
        })
    }

    pub fn failing(connection_string: &str) -> Arc<Self> {
        Arc::new(Self {
            connection_string: connection_string.to_owned(),
            fail_open: true,
            ..Self::default()
        })
    }

    /// Connection sharing `tables` with other connections to the same "database".
    pub fn sharing(connection_string: &str, tables: Arc<Mutex<Tables>>) -> Arc<Self> {
        Arc::new(Self {
            connection_string: connection_string.to_owned(),
            tables,
            ..Self::default()
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::ConnectionClosed)
        }
    }
}

#[async_trait]
impl RelationalConnection for FakeConnection {
    fn provider_name(&self) -> &'static str {
        "fake-sql"
    }

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), StoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(StoreError::backend(
                "fake-sql",
                std::io::Error::other("server unreachable"),
            ));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn ensure_table(&self, table: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut tables = self.tables.lock();
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_owned(), BTreeMap::new());
        Ok(true)
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        self.check_open()?;
        let tables = self.tables.lock();
        let rows = tables.get(table).ok_or_else(|| {
            StoreError::backend("fake-sql", std::io::Error::other(format!("no such table: {table}")))
        })?;
        Ok(rows
            .iter()
            .map(|(k, v)| Record::new(k.clone(), v.clone()))
            .collect())
    }

    async fn upsert(&self, table: &str, records: &[Record]) -> Result<usize, StoreError> {
        self.check_open()?;
        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_owned()).or_default();
        for r in records {
            rows.insert(r.key.clone(), r.payload.clone());
        }
        Ok(records.len())
    }
}

/// Factory that remembers every connection it created.
#[derive(Debug, Default)]
pub struct FakeFactory {
    pub created: Mutex<Vec<Arc<FakeConnection>>>,
    tables: Arc<Mutex<Tables>>,
}

impl FakeFactory {
    /// Factory whose connections all see a table `customers` with `rows` rows.
    pub fn seeded(rows: usize) -> Arc<Self> {
        let mut customers = BTreeMap::new();
        for i in 0..rows {
            customers.insert(format!("C{i:03}"), serde_json::json!({ "name": format!("Customer {i}") }));
        }
        let mut tables = HashMap::new();
        tables.insert("customers".to_owned(), customers);
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            tables: Arc::new(Mutex::new(tables)),
        })
    }

    pub fn last(&self) -> Arc<FakeConnection> {
        Arc::clone(self.created.lock().last().expect("no connection created"))
    }
}

impl ConnectionFactory for FakeFactory {
    fn provider_name(&self) -> &'static str {
        "fake-sql"
    }

    fn create(
        &self,
        connection_string: &str,
    ) -> Result<Arc<dyn RelationalConnection>, StoreError> {
        let conn = if connection_string.contains("unreachable") {
            FakeConnection::failing(connection_string)
        } else {
            FakeConnection::sharing(connection_string, Arc::clone(&self.tables))
        };
        self.created.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}

/// Non-relational provider serving a fixed, possibly empty, list of records.
#[derive(Debug, Default)]
pub struct ListProvider {
    pub records: Vec<Record>,
    pub releases: Arc<AtomicUsize>,
}

impl ListProvider {
    pub fn empty() -> Self {
        Self::default()
    }
}

impl OptionsExtension for ListProvider {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo { name: "list" }
    }

    fn as_provider(self: Arc<Self>) -> Option<Arc<dyn ProviderExtension>> {
        Some(self)
    }
}

#[async_trait]
impl ProviderExtension for ListProvider {
    fn provider_name(&self) -> &'static str {
        "list"
    }

    async fn open_store(&self, _services: &ServiceRegistry) -> Result<StoreLease, StoreError> {
        Ok(StoreLease::owned(Arc::new(ListStore {
            records: self.records.clone(),
            releases: Arc::clone(&self.releases),
        })))
    }
}

struct ListStore {
    records: Vec<Record>,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl DataStore for ListStore {
    fn provider_name(&self) -> &'static str {
        "list"
    }

    async fn ensure_created(&self, _entity_set: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn query(&self, _entity_set: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.clone())
    }

    async fn upsert(&self, _entity_set: &str, records: &[Record]) -> Result<usize, StoreError> {
        Ok(records.len())
    }

    async fn release(&self) -> Result<(), StoreError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
