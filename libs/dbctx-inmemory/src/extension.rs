use std::sync::Arc;

use async_trait::async_trait;
use dbctx::{
    ContextError, ContextOptions, DataStore, ExtensionInfo, OptionsExtension, ProviderExtension,
    Record, ServiceRegistry, StoreError, StoreLease, validate_entity_set,
};

use crate::database::{InMemoryDatabase, InMemoryDatabaseRoot};

/// Provider name reported by the in-memory store.
pub const PROVIDER_NAME: &str = "in-memory";

/// Selects the in-memory store for a context.
///
/// With `persist` set, the named database lives in a root and outlives the context: the
/// explicit `root` if given, else the root registered with the service collection, else
/// [`InMemoryDatabaseRoot::shared`]. Without it, every context instance gets a private
/// database that is cleared on dispose.
#[derive(Clone, Debug)]
pub struct InMemoryOptionsExtension {
    database_name: String,
    persist: bool,
    root: Option<Arc<InMemoryDatabaseRoot>>,
}

impl InMemoryOptionsExtension {
    #[must_use]
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            persist: true,
            root: None,
        }
    }

    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: Arc<InMemoryDatabaseRoot>) -> Self {
        self.root = Some(root);
        self.persist = true;
        self
    }

    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[must_use]
    pub fn persist(&self) -> bool {
        self.persist
    }

    #[must_use]
    pub fn root(&self) -> Option<&Arc<InMemoryDatabaseRoot>> {
        self.root.as_ref()
    }

    fn resolve_root(&self, services: &ServiceRegistry) -> Arc<InMemoryDatabaseRoot> {
        if let Some(root) = &self.root {
            return Arc::clone(root);
        }
        services
            .try_get::<InMemoryDatabaseRoot>()
            .unwrap_or_else(InMemoryDatabaseRoot::shared)
    }
}

impl OptionsExtension for InMemoryOptionsExtension {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo { name: PROVIDER_NAME }
    }

    fn log_fragment(&self, _sensitive: bool) -> String {
        format!(
            "{PROVIDER_NAME} database={} persist={}",
            self.database_name, self.persist
        )
    }

    fn as_provider(self: Arc<Self>) -> Option<Arc<dyn ProviderExtension>> {
        Some(self)
    }

    fn validate(&self, _options: &ContextOptions) -> Result<(), ContextError> {
        if self.database_name.trim().is_empty() {
            return Err(ContextError::InvalidConfiguration(
                "in-memory provider requires a database name".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderExtension for InMemoryOptionsExtension {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn open_store(&self, services: &ServiceRegistry) -> Result<StoreLease, StoreError> {
        if self.persist {
            let database = self.resolve_root(services).database(&self.database_name);
            tracing::debug!(database = %self.database_name, "Attached to shared in-memory database");
            return Ok(StoreLease::borrowed(Arc::new(InMemoryStore { database })));
        }

        let database = Arc::new(InMemoryDatabase::new(self.database_name.clone()));
        tracing::debug!(database = %self.database_name, "Created private in-memory database");
        Ok(StoreLease::owned(Arc::new(InMemoryStore { database })))
    }
}

/// [`DataStore`] over one [`InMemoryDatabase`].
struct InMemoryStore {
    database: Arc<InMemoryDatabase>,
}

#[async_trait]
impl DataStore for InMemoryStore {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn ensure_created(&self, entity_set: &str) -> Result<bool, StoreError> {
        validate_entity_set(entity_set)?;
        Ok(self.database.ensure_table(entity_set))
    }

    async fn query(&self, entity_set: &str) -> Result<Vec<Record>, StoreError> {
        validate_entity_set(entity_set)?;
        Ok(self.database.records(entity_set))
    }

    async fn upsert(&self, entity_set: &str, records: &[Record]) -> Result<usize, StoreError> {
        validate_entity_set(entity_set)?;
        Ok(self.database.upsert(entity_set, records))
    }

    async fn release(&self) -> Result<(), StoreError> {
        tracing::debug!(database = %self.database.name(), "Clearing private in-memory database");
        self.database.clear();
        Ok(())
    }
}
