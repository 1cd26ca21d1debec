use std::sync::Arc;

use dbctx::{
    OptionsBuilder, Ownership, RelationalConnection, RelationalOptionsExtension, ServiceCollection,
};

use crate::connection::{PROVIDER_NAME, SqliteConnectionFactory};

/// Options extension selecting SQLite.
pub type SqliteOptionsExtension = RelationalOptionsExtension<SqliteConnectionFactory>;

/// Extension trait selecting SQLite on an [`OptionsBuilder`].
pub trait SqliteBuilderExt {
    /// Connect with `connection_string`; the context opens the connection on first use
    /// and closes it on dispose.
    fn use_sqlite(&mut self, connection_string: &str) -> &mut Self;

    /// Use a connection created by the caller. With [`Ownership::Borrowed`] the caller
    /// closes it; with [`Ownership::Transferred`] the context does.
    fn use_sqlite_connection(
        &mut self,
        connection: Arc<dyn RelationalConnection>,
        ownership: Ownership,
    ) -> &mut Self;
}

impl SqliteBuilderExt for OptionsBuilder {
    fn use_sqlite(&mut self, connection_string: &str) -> &mut Self {
        self.add_or_update_extension(SqliteOptionsExtension::with_connection_string(
            Arc::new(SqliteConnectionFactory),
            connection_string,
        ))
    }

    fn use_sqlite_connection(
        &mut self,
        connection: Arc<dyn RelationalConnection>,
        ownership: Ownership,
    ) -> &mut Self {
        self.add_or_update_extension(SqliteOptionsExtension::with_connection(
            Arc::new(SqliteConnectionFactory),
            connection,
            ownership,
        ))
    }
}

/// Registers the SQLite provider's services with a [`ServiceCollection`].
pub trait SqliteServicesExt {
    /// Register the connection factory and the `sqlite` capability. SQLite extensions
    /// create their connections through the registered factory. Contexts still have to
    /// select the provider in their options.
    fn add_sqlite_provider(&mut self) -> &mut Self;
}

impl SqliteServicesExt for ServiceCollection {
    fn add_sqlite_provider(&mut self) -> &mut Self {
        self.add_singleton(Arc::new(SqliteConnectionFactory))
            .add_capability(PROVIDER_NAME)
    }
}
