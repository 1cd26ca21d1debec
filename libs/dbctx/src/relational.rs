//! Relational provider plumbing shared by SQL backends.
//!
//! A backend crate supplies a [`RelationalConnection`] and a [`ConnectionFactory`]; this
//! module turns them into a provider extension and a [`DataStore`]. The extension type is
//! generic over the factory, so every backend is its own extension kind.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ContextError;
use crate::extension::{ExtensionInfo, OptionsExtension, ProviderExtension};
use crate::hook::Ownership;
use crate::options::ContextOptions;
use crate::services::ServiceRegistry;
use crate::settings::redact_connection_string;
use crate::store::{DataStore, Record, StoreError, StoreLease, validate_entity_set};

/// A connection to a relational database.
///
/// Implementations are created closed and must tolerate `open`/`close` being called more
/// than once.
#[async_trait]
pub trait RelationalConnection: fmt::Debug + Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn connection_string(&self) -> &str;

    fn is_open(&self) -> bool;

    /// # Errors
    /// Returns `StoreError` if the database cannot be reached.
    async fn open(&self) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if shutting the connection down fails.
    async fn close(&self) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the table cannot be created or the connection is closed.
    async fn ensure_table(&self, table: &str) -> Result<bool, StoreError>;

    /// # Errors
    /// Returns `StoreError` if the table is missing or the connection is closed.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Record>, StoreError>;

    /// # Errors
    /// Returns `StoreError` if a write fails or the connection is closed.
    async fn upsert(&self, table: &str, records: &[Record]) -> Result<usize, StoreError>;
}

/// Creates connections from connection strings.
pub trait ConnectionFactory: fmt::Debug + Send + Sync + 'static {
    fn provider_name(&self) -> &'static str;

    /// Build a closed connection.
    ///
    /// # Errors
    /// Returns `StoreError` if the connection string is malformed.
    fn create(&self, connection_string: &str)
    -> Result<Arc<dyn RelationalConnection>, StoreError>;
}

/// Where a relational provider gets its connection. The two sources are exclusive.
#[derive(Clone)]
pub enum ConnectionSource {
    /// The provider creates, opens and owns the connection.
    ConnectionString(String),
    /// A live connection handed in by the caller.
    Connection {
        connection: Arc<dyn RelationalConnection>,
        ownership: Ownership,
    },
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionString(cs) => f
                .debug_tuple("ConnectionString")
                .field(&redact_connection_string(cs))
                .finish(),
            Self::Connection { ownership, .. } => f
                .debug_struct("Connection")
                .field("ownership", ownership)
                .finish_non_exhaustive(),
        }
    }
}

/// Provider extension for a relational backend built by factory `F`.
pub struct RelationalOptionsExtension<F> {
    source: ConnectionSource,
    factory: Arc<F>,
}

impl<F: ConnectionFactory> RelationalOptionsExtension<F> {
    #[must_use]
    pub fn with_connection_string(factory: Arc<F>, connection_string: impl Into<String>) -> Self {
        Self {
            source: ConnectionSource::ConnectionString(connection_string.into()),
            factory,
        }
    }

    #[must_use]
    pub fn with_connection(
        factory: Arc<F>,
        connection: Arc<dyn RelationalConnection>,
        ownership: Ownership,
    ) -> Self {
        Self {
            source: ConnectionSource::Connection {
                connection,
                ownership,
            },
            factory,
        }
    }

    #[must_use]
    pub fn source(&self) -> &ConnectionSource {
        &self.source
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        match &self.source {
            ConnectionSource::ConnectionString(cs) => cs,
            ConnectionSource::Connection { connection, .. } => connection.connection_string(),
        }
    }

    fn store(&self, connection: Arc<dyn RelationalConnection>) -> Arc<dyn DataStore> {
        Arc::new(RelationalStore {
            provider: self.factory.provider_name(),
            connection,
        })
    }
}

impl<F> fmt::Debug for RelationalOptionsExtension<F>
where
    F: ConnectionFactory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalOptionsExtension")
            .field("provider", &self.factory.provider_name())
            .field("source", &self.source)
            .finish()
    }
}

impl<F: ConnectionFactory> OptionsExtension for RelationalOptionsExtension<F> {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo { name: self.factory.provider_name() }
    }

    fn log_fragment(&self, sensitive: bool) -> String {
        let cs = self.connection_string();
        let shown = if sensitive {
            cs.to_owned()
        } else {
            redact_connection_string(cs)
        };
        format!("{} connection_string={shown}", self.factory.provider_name())
    }

    fn as_provider(self: Arc<Self>) -> Option<Arc<dyn ProviderExtension>> {
        Some(self)
    }

    fn validate(&self, _options: &ContextOptions) -> Result<(), ContextError> {
        if self.connection_string().trim().is_empty() {
            return Err(ContextError::InvalidConfiguration(format!(
                "{} provider requires a non-empty connection string",
                self.factory.provider_name()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<F: ConnectionFactory> ProviderExtension for RelationalOptionsExtension<F> {
    fn provider_name(&self) -> &'static str {
        self.factory.provider_name()
    }

    async fn open_store(&self, services: &ServiceRegistry) -> Result<StoreLease, StoreError> {
        match &self.source {
            ConnectionSource::ConnectionString(cs) => {
                // A factory registered with the service collection takes precedence.
                let connection = match services.try_get::<F>() {
                    Some(registered) => registered.create(cs)?,
                    None => self.factory.create(cs)?,
                };
                open_or_close(&connection).await?;
                tracing::debug!(
                    provider = self.factory.provider_name(),
                    "Opened owned connection"
                );
                Ok(StoreLease::owned(self.store(connection)))
            }
            ConnectionSource::Connection {
                connection,
                ownership,
            } => {
                let connection = Arc::clone(connection);
                match ownership {
                    Ownership::Transferred => {
                        if !connection.is_open() {
                            open_or_close(&connection).await?;
                        }
                        Ok(StoreLease::owned(self.store(connection)))
                    }
                    Ownership::Borrowed => {
                        if !connection.is_open() {
                            connection.open().await?;
                        }
                        Ok(StoreLease::borrowed(self.store(connection)))
                    }
                }
            }
        }
    }
}

/// Open `connection`; on failure close it before returning the open error.
async fn open_or_close(connection: &Arc<dyn RelationalConnection>) -> Result<(), StoreError> {
    if let Err(err) = connection.open().await {
        if let Err(close_err) = connection.close().await {
            tracing::warn!(error = %close_err, "Failed to close connection after open error");
        }
        return Err(err);
    }
    Ok(())
}

/// [`DataStore`] over a relational connection; entity sets map to tables.
struct RelationalStore {
    provider: &'static str,
    connection: Arc<dyn RelationalConnection>,
}

#[async_trait]
impl DataStore for RelationalStore {
    fn provider_name(&self) -> &'static str {
        self.provider
    }

    async fn ensure_created(&self, entity_set: &str) -> Result<bool, StoreError> {
        validate_entity_set(entity_set)?;
        self.connection.ensure_table(entity_set).await
    }

    async fn query(&self, entity_set: &str) -> Result<Vec<Record>, StoreError> {
        validate_entity_set(entity_set)?;
        self.connection.fetch_all(entity_set).await
    }

    async fn upsert(&self, entity_set: &str, records: &[Record]) -> Result<usize, StoreError> {
        validate_entity_set(entity_set)?;
        self.connection.upsert(entity_set, records).await
    }

    async fn release(&self) -> Result<(), StoreError> {
        tracing::debug!(provider = self.provider, "Closing owned connection");
        self.connection.close().await
    }
}
