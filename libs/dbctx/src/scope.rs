//! Units of work and the per-scope context cache.
//!
//! Typical flow:
//! - At startup, build a [`ServiceCollection`]: shared services, provider capabilities,
//!   options per context kind and one factory per context kind.
//! - Per unit of work, [`ServiceProvider::create_scope`] and [`Scope::resolve`] the
//!   contexts it needs; repeated resolves within the scope return the same instance.
//! - End the unit of work with [`Scope::dispose`], which disposes every cached context.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::builder::OptionsBuilder;
use crate::context::{DbContext, ScopedInstance};
use crate::error::{ContextError, Result};
use crate::hook::{ConfigureContext, SeedInput};
use crate::options::{ContextOptions, ContextType};
use crate::services::ServiceRegistry;
use crate::settings::DataSettings;

type ContextFactoryFn<C> = dyn Fn(&ServiceRegistry) -> Result<(C, SeedInput)> + Send + Sync;

struct ContextRegistration<C: ConfigureContext> {
    factory: Box<ContextFactoryFn<C>>,
}

/// Startup-time registrations. Consumed by [`build`](Self::build).
#[derive(Default)]
pub struct ServiceCollection {
    registry: ServiceRegistry,
    contexts: HashMap<ContextType, Box<dyn Any + Send + Sync>>,
}

impl ServiceCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared services added so far.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn add_singleton<T>(&mut self, service: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registry.register::<T>(service);
        self
    }

    pub fn add_settings(&mut self, settings: DataSettings) -> &mut Self {
        self.add_singleton(Arc::new(settings))
    }

    /// Mark a provider's services as available. This never selects a provider.
    pub fn add_capability(&mut self, name: &'static str) -> &mut Self {
        self.registry.add_capability(name);
        self
    }

    /// Options injected into every `C` built by the default factory. Untagged snapshots
    /// are tagged for `C`.
    pub fn add_context_options<C: ConfigureContext>(&mut self, options: ContextOptions) -> &mut Self {
        let options = match options.context_type() {
            Some(_) => options,
            None => options.tagged_for::<C>(),
        };
        self.registry.register_context_options::<C>(Arc::new(options));
        self
    }

    /// Build the options injected into `C` with a builder.
    pub fn configure_context_options<C, F>(&mut self, configure: F) -> &mut Self
    where
        C: ConfigureContext,
        F: FnOnce(&mut OptionsBuilder),
    {
        let mut builder = OptionsBuilder::for_context::<C>();
        configure(&mut builder);
        self.registry
            .register_context_options::<C>(builder.into_options());
        self
    }

    /// Register `C` with the default factory: `C::default()`, seeded with the options
    /// registered for `C` if there are any.
    pub fn add_db_context<C: ConfigureContext + Default>(&mut self) -> &mut Self {
        self.add_db_context_with::<C, _>(|services| {
            let seed = services
                .context_options::<C>()
                .map_or(SeedInput::Empty, SeedInput::Options);
            Ok((C::default(), seed))
        })
    }

    /// Register `C` with a custom factory that picks its constructor inputs from the
    /// registry (options, a named connection string, a shared connection).
    pub fn add_db_context_with<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: ConfigureContext,
        F: Fn(&ServiceRegistry) -> Result<(C, SeedInput)> + Send + Sync + 'static,
    {
        self.contexts.insert(
            ContextType::of::<C>(),
            Box::new(ContextRegistration::<C> {
                factory: Box::new(factory),
            }),
        );
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<ServiceProvider> {
        tracing::debug!(
            contexts = self.contexts.len(),
            services = self.registry.len(),
            capabilities = ?self.registry.capabilities(),
            "Built service provider"
        );
        Arc::new(ServiceProvider {
            registry: Arc::new(self.registry),
            contexts: self.contexts,
        })
    }
}

/// Root of the container: shared services plus context factories.
pub struct ServiceProvider {
    registry: Arc<ServiceRegistry>,
    contexts: HashMap<ContextType, Box<dyn Any + Send + Sync>>,
}

impl ServiceProvider {
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn is_registered<C: ConfigureContext>(&self) -> bool {
        self.contexts.contains_key(&ContextType::of::<C>())
    }

    /// Start a new unit of work.
    #[must_use]
    pub fn create_scope(self: &Arc<Self>) -> Scope {
        let scope = Scope {
            id: Uuid::new_v4(),
            provider: Arc::clone(self),
            cache: ScopeCache::new(),
        };
        tracing::debug!(scope = %scope.id, "Created scope");
        scope
    }

    fn construct<C: ConfigureContext>(&self) -> Result<DbContext<C>> {
        let ty = ContextType::of::<C>();
        let registration = self
            .contexts
            .get(&ty)
            .and_then(|r| r.downcast_ref::<ContextRegistration<C>>())
            .ok_or_else(|| ContextError::ContextNotRegistered(ty.short_name().to_owned()))?;

        let (config, seed) = (registration.factory)(&self.registry)?;
        Ok(DbContext::with_services(
            config,
            seed,
            Arc::clone(&self.registry),
        ))
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registry", &self.registry)
            .field("contexts", &self.contexts.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A unit of work owning at most one instance per context kind.
pub struct Scope {
    id: Uuid,
    provider: Arc<ServiceProvider>,
    cache: ScopeCache,
}

impl Scope {
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    /// The scope's instance of `C`, built on first request.
    ///
    /// # Errors
    /// - `ContextError::UseAfterDispose` once the scope was disposed.
    /// - `ContextError::ContextNotRegistered` if `C` has no factory.
    /// - Whatever the registered factory returns.
    pub fn resolve<C: ConfigureContext>(&self) -> Result<Arc<DbContext<C>>> {
        self.cache.get_or_create(|| {
            let ctx = self.provider.construct::<C>()?;
            tracing::debug!(
                scope = %self.id,
                context = %ContextType::of::<C>(),
                instance = %ctx.instance_id(),
                "Constructed scoped context"
            );
            Ok(ctx)
        })
    }

    /// Dispose every cached instance; the scope is unusable afterwards.
    ///
    /// # Errors
    /// Returns the first error raised by an instance; all instances are still disposed.
    pub async fn dispose(&self) -> Result<()> {
        tracing::debug!(scope = %self.id, instances = self.cache.len(), "Disposing scope");
        self.cache.dispose().await
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.cache.is_disposed()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !self.cache.is_disposed() && !self.cache.is_empty() {
            tracing::warn!(
                scope = %self.id,
                instances = self.cache.len(),
                "Scope dropped without dispose; owned connections were not released"
            );
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("instances", &self.cache.len())
            .field("disposed", &self.cache.is_disposed())
            .finish_non_exhaustive()
    }
}

struct CachedInstance {
    any: Arc<dyn Any + Send + Sync>,
    scoped: Arc<dyn ScopedInstance>,
}

/// At most one instance per type, built once even under concurrent first requests.
///
/// Finished instances live in a `DashMap`, so a hit is one shard read. Construction of a
/// missing key is serialised by a per-key mutex; other keys are not blocked.
#[derive(Default)]
pub struct ScopeCache {
    instances: DashMap<ContextType, CachedInstance>,
    building: DashMap<ContextType, Arc<Mutex<()>>>,
    disposed: AtomicBool,
}

impl ScopeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached `T`, or the result of `factory` which is then cached.
    ///
    /// `factory` runs at most once per `T` for the lifetime of the cache, even when several
    /// threads ask for a missing `T` at the same time.
    ///
    /// # Errors
    /// `ContextError::UseAfterDispose` after [`dispose`](Self::dispose), or the factory's error
    /// (nothing is cached in that case).
    pub fn get_or_create<T, F>(&self, factory: F) -> Result<Arc<T>>
    where
        T: ScopedInstance + 'static,
        F: FnOnce() -> Result<T>,
    {
        let key = ContextType::of::<T>();
        self.ensure_live()?;
        if let Some(hit) = self.lookup::<T>(&key) {
            return Ok(hit);
        }

        let lock = Arc::clone(self.building.entry(key).or_default().value());
        let _guard = lock.lock();

        self.ensure_live()?;
        if let Some(hit) = self.lookup::<T>(&key) {
            return Ok(hit);
        }

        let instance = Arc::new(factory()?);
        self.instances.insert(
            key,
            CachedInstance {
                any: Arc::clone(&instance) as Arc<dyn Any + Send + Sync>,
                scoped: Arc::clone(&instance) as Arc<dyn ScopedInstance>,
            },
        );
        self.building.remove(&key);

        // A dispose that started during the build is waiting on our lock and will release
        // the instance just cached.
        self.ensure_live()?;
        Ok(instance)
    }

    /// Dispose every cached instance exactly once, in no particular order.
    ///
    /// Builds already running when this is called finish first, and their instances are
    /// disposed with the rest.
    ///
    /// # Errors
    /// Returns the first error; the remaining instances are disposed regardless.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.wait_for_builds();

        let keys: Vec<ContextType> = self.instances.iter().map(|e| *e.key()).collect();
        let mut first_error = None;
        for key in keys {
            let Some((_, cached)) = self.instances.remove(&key) else {
                continue;
            };
            if let Err(err) = cached.scoped.dispose_scoped().await {
                tracing::warn!(instance = %key, error = %err, "Failed to dispose scoped instance");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn lookup<T: Send + Sync + 'static>(&self, key: &ContextType) -> Option<Arc<T>> {
        let any = Arc::clone(&self.instances.get(key)?.any);
        any.downcast::<T>().ok()
    }

    /// Block until every build that passed the liveness check has cached its instance.
    /// Builders that take the lock later see the disposed flag and give up.
    fn wait_for_builds(&self) {
        let in_flight: Vec<Arc<Mutex<()>>> = self
            .building
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for lock in in_flight {
            let _built = lock.lock();
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ContextError::disposed("scope"));
        }
        Ok(())
    }
}
