//! Services shared by every context a [`ServiceProvider`](crate::ServiceProvider) builds.
//!
//! Three kinds of entry live here, all written at startup and read at resolve time:
//! - shared services keyed by type, e.g. an in-memory database root or the data settings;
//! - the options snapshot injected into each context kind;
//! - the names of providers whose services were added (capabilities).

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::options::{ContextOptions, ContextType};
use crate::settings::DataSettings;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service '{service}' is not registered")]
    NotFound { service: &'static str },
}

/// One shared service: an `Arc<T>` behind `Any`, plus the type name for diagnostics.
struct SharedService {
    name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

/// Shared services, injected options per context kind, and provider capabilities.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<TypeId, SharedService>>,
    context_options: RwLock<HashMap<ContextType, Arc<ContextOptions>>>,
    capabilities: RwLock<BTreeSet<&'static str>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the shared `T`, replacing any earlier one. `T` may be a trait object.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.write().insert(
            TypeId::of::<T>(),
            SharedService {
                name: std::any::type_name::<T>(),
                value: Box::new(service),
            },
        );
    }

    /// The shared `T`.
    ///
    /// # Errors
    /// Returns `ServiceError::NotFound` if nothing is registered for `T`.
    pub fn get<T>(&self) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|s| s.value.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                service: std::any::type_name::<T>(),
            })
    }

    #[must_use]
    pub fn try_get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().ok()
    }

    /// Registered data settings.
    ///
    /// # Errors
    /// Returns `ServiceError::NotFound` if no settings were added.
    pub fn settings(&self) -> Result<Arc<DataSettings>, ServiceError> {
        self.get::<DataSettings>()
    }

    /// Set the options snapshot injected into contexts of kind `C`.
    pub fn register_context_options<C: 'static>(&self, options: Arc<ContextOptions>) {
        self.context_options
            .write()
            .insert(ContextType::of::<C>(), options);
    }

    #[must_use]
    pub fn context_options<C: 'static>(&self) -> Option<Arc<ContextOptions>> {
        self.context_options
            .read()
            .get(&ContextType::of::<C>())
            .cloned()
    }

    /// Record that a provider's services were added. Selection ignores capabilities; it
    /// only looks at the extensions on the options snapshot.
    pub fn add_capability(&self, name: &'static str) {
        self.capabilities.write().insert(name);
    }

    /// Registered capability names, sorted.
    #[must_use]
    pub fn capabilities(&self) -> Vec<&'static str> {
        self.capabilities.read().iter().copied().collect()
    }

    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.read().contains(name)
    }

    /// Number of shared services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut services: Vec<&'static str> =
            self.services.read().values().map(|s| s.name).collect();
        services.sort_unstable();
        let mut contexts: Vec<String> = self
            .context_options
            .read()
            .keys()
            .map(ToString::to_string)
            .collect();
        contexts.sort_unstable();

        f.debug_struct("ServiceRegistry")
            .field("services", &services)
            .field("context_options", &contexts)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
