use std::sync::Arc;

use dbctx::{OptionsBuilder, ServiceCollection};

use crate::database::InMemoryDatabaseRoot;
use crate::extension::{InMemoryOptionsExtension, PROVIDER_NAME};

/// Extension trait selecting the in-memory store on an [`OptionsBuilder`].
///
/// # Example
///
/// ```
/// use dbctx::{ConfigureContext, OptionsBuilder, SeedInput};
/// use dbctx_inmemory::InMemoryBuilderExt;
///
/// struct CartContext;
///
/// impl ConfigureContext for CartContext {
///     fn on_configuring(&self, builder: &mut OptionsBuilder, _seed: &SeedInput) {
///         if !builder.is_configured() {
///             builder.use_in_memory_database("carts");
///         }
///     }
/// }
/// ```
pub trait InMemoryBuilderExt {
    /// Use the shared in-memory database `name`.
    fn use_in_memory_database(&mut self, name: &str) -> &mut Self;

    /// Use database `name`, shared when `persist` is set, private to the context otherwise.
    fn use_in_memory_database_with(&mut self, name: &str, persist: bool) -> &mut Self;

    /// Use database `name` held by `root`.
    fn use_in_memory_database_root(
        &mut self,
        name: &str,
        root: Arc<InMemoryDatabaseRoot>,
    ) -> &mut Self;
}

impl InMemoryBuilderExt for OptionsBuilder {
    fn use_in_memory_database(&mut self, name: &str) -> &mut Self {
        self.add_or_update_extension(InMemoryOptionsExtension::new(name))
    }

    fn use_in_memory_database_with(&mut self, name: &str, persist: bool) -> &mut Self {
        self.add_or_update_extension(InMemoryOptionsExtension::new(name).with_persist(persist))
    }

    fn use_in_memory_database_root(
        &mut self,
        name: &str,
        root: Arc<InMemoryDatabaseRoot>,
    ) -> &mut Self {
        self.add_or_update_extension(InMemoryOptionsExtension::new(name).with_root(root))
    }
}

/// Registers the in-memory provider's services with a [`ServiceCollection`].
pub trait InMemoryServicesExt {
    /// Register a fresh database root and the `in-memory` capability. Contexts still
    /// have to select the provider in their options.
    fn add_in_memory_provider(&mut self) -> &mut Self;

    /// Like [`add_in_memory_provider`](Self::add_in_memory_provider) with a caller-owned root.
    fn add_in_memory_provider_with_root(&mut self, root: Arc<InMemoryDatabaseRoot>) -> &mut Self;
}

impl InMemoryServicesExt for ServiceCollection {
    fn add_in_memory_provider(&mut self) -> &mut Self {
        self.add_in_memory_provider_with_root(Arc::new(InMemoryDatabaseRoot::new()))
    }

    fn add_in_memory_provider_with_root(&mut self, root: Arc<InMemoryDatabaseRoot>) -> &mut Self {
        self.add_singleton::<InMemoryDatabaseRoot>(root)
            .add_capability(PROVIDER_NAME)
    }
}
