use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::builder::OptionsBuilder;
use crate::error::{ContextError, Result};
use crate::extension::ProviderExtension;
use crate::hook::{ConfigureContext, SeedInput};
use crate::options::{ContextOptions, ContextType};
use crate::selector::ProviderSelector;
use crate::services::ServiceRegistry;
use crate::store::{DataStore, Record, StoreLease};

/// A database context: one configuration hook, lazily resolved options, and at most one
/// opened store.
///
/// Construction never fails and never runs the hook. The first call that needs the
/// configuration runs [`ConfigureContext::on_configuring`] once and caches the snapshot;
/// the first data call opens the store once and keeps the lease until [`dispose`].
///
/// Instances are shared as `Arc<DbContext<C>>` but are meant for one logical sequence of
/// operations at a time.
///
/// [`dispose`]: DbContext::dispose
pub struct DbContext<C: ConfigureContext> {
    instance_id: Uuid,
    config: C,
    seed: SeedInput,
    services: Arc<ServiceRegistry>,
    options: OnceLock<Arc<ContextOptions>>,
    store: OnceCell<StoreLease>,
    disposed: AtomicBool,
    released: AtomicBool,
}

impl<C: ConfigureContext> DbContext<C> {
    /// Context with nothing supplied; the hook decides everything.
    #[must_use]
    pub fn new(config: C) -> Self {
        Self::with_seed(config, SeedInput::Empty)
    }

    #[must_use]
    pub fn with_seed(config: C, seed: SeedInput) -> Self {
        Self::with_services(config, seed, Arc::new(ServiceRegistry::new()))
    }

    /// Container path: shared services come from the provider's registry.
    #[must_use]
    pub fn with_services(config: C, seed: SeedInput, services: Arc<ServiceRegistry>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            config,
            seed,
            services,
            options: OnceLock::new(),
            store: OnceCell::new(),
            disposed: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    // ---- public read-only API ----

    #[inline]
    pub fn config(&self) -> &C {
        &self.config
    }

    #[inline]
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    #[inline]
    pub fn seed(&self) -> &SeedInput {
        &self.seed
    }

    #[inline]
    pub fn context_type(&self) -> ContextType {
        ContextType::of::<C>()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // ---- lazy resolution ----

    /// The finished options snapshot; runs the configuration hook on first call.
    ///
    /// # Errors
    /// - `ContextError::UseAfterDispose` after [`dispose`](Self::dispose).
    /// - `ContextError::OptionsContextMismatch` if the seeded snapshot was built for
    ///   another context kind.
    /// - `ContextError::InvalidConfiguration` if an extension rejects the snapshot.
    pub fn options(&self) -> Result<Arc<ContextOptions>> {
        self.ensure_live()?;
        self.check_seed_tag()?;

        let options = self.options.get_or_init(|| self.configure());
        for extension in options.extensions() {
            extension.validate(options)?;
        }
        Ok(Arc::clone(options))
    }

    /// The selected data store provider.
    ///
    /// # Errors
    /// Everything [`options`](Self::options) returns, plus
    /// `ContextError::NoDataStoreConfigured` / `ContextError::MultipleDataStoresConfigured`.
    pub fn provider(&self) -> Result<Arc<dyn ProviderExtension>> {
        let options = self.options()?;
        ProviderSelector::resolve(&options)
    }

    /// Name of the selected provider.
    ///
    /// # Errors
    /// See [`provider`](Self::provider).
    pub fn provider_name(&self) -> Result<&'static str> {
        Ok(self.provider()?.provider_name())
    }

    // ---- data access ----

    /// Create the entity set if missing.
    ///
    /// # Errors
    /// Configuration errors from [`provider`](Self::provider), or store errors.
    pub async fn ensure_created(&self, entity_set: &str) -> Result<bool> {
        let store = self.store().await?;
        Ok(store.ensure_created(entity_set).await?)
    }

    /// All records of an entity set.
    ///
    /// # Errors
    /// Configuration errors from [`provider`](Self::provider), or store errors.
    pub async fn query(&self, entity_set: &str) -> Result<Vec<Record>> {
        let store = self.store().await?;
        Ok(store.query(entity_set).await?)
    }

    /// Insert or replace records by key.
    ///
    /// # Errors
    /// Configuration errors from [`provider`](Self::provider), or store errors.
    pub async fn upsert(&self, entity_set: &str, records: &[Record]) -> Result<usize> {
        let store = self.store().await?;
        Ok(store.upsert(entity_set, records).await?)
    }

    /// Release everything this context owns. Later calls are no-ops; every other operation
    /// fails with `ContextError::UseAfterDispose` afterwards.
    ///
    /// # Errors
    /// Returns the store error if releasing an owned store fails.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.store.get() {
            Some(lease) => self.release(lease).await,
            None => Ok(()),
        }
    }

    // ---- internals ----

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ContextError::disposed(format!(
                "context '{}'",
                self.context_type()
            )));
        }
        Ok(())
    }

    fn check_seed_tag(&self) -> Result<()> {
        let Some(seeded) = self.seed.as_options() else {
            return Ok(());
        };
        match seeded.context_type() {
            Some(expected) if expected != self.context_type() => {
                Err(ContextError::OptionsContextMismatch {
                    expected: expected.short_name().to_owned(),
                    actual: self.context_type().short_name().to_owned(),
                })
            }
            _ => Ok(()),
        }
    }

    fn configure(&self) -> Arc<ContextOptions> {
        let seed = self
            .seed
            .as_options()
            .map_or_else(|| Arc::new(ContextOptions::for_context::<C>()), Arc::clone);
        let mut builder = OptionsBuilder::new(seed);
        self.config.on_configuring(&mut builder, &self.seed);
        let options = builder.into_options();

        tracing::debug!(
            context = %self.context_type(),
            instance = %self.instance_id,
            seed = self.seed.kind(),
            extensions = %options.describe(),
            "Configured context options"
        );
        options
    }

    async fn store(&self) -> Result<Arc<dyn DataStore>> {
        let provider = self.provider()?;
        let lease = self
            .store
            .get_or_try_init(|| async {
                let lease = provider.open_store(&self.services).await?;
                tracing::debug!(
                    context = %self.context_type(),
                    instance = %self.instance_id,
                    provider = provider.provider_name(),
                    owned = lease.is_owned(),
                    "Opened data store"
                );
                Ok::<_, ContextError>(lease)
            })
            .await?;

        // A dispose that raced the open did not see the lease; release it here.
        if self.is_disposed() {
            self.release(lease).await?;
            self.ensure_live()?;
        }
        Ok(Arc::clone(lease.store()))
    }

    async fn release(&self, lease: &StoreLease) -> Result<()> {
        if !lease.is_owned() || self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(
            context = %self.context_type(),
            instance = %self.instance_id,
            provider = lease.store().provider_name(),
            "Releasing owned store"
        );
        lease.store().release().await?;
        Ok(())
    }
}

impl<C: ConfigureContext> fmt::Debug for DbContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("context_type", &self.context_type())
            .field("instance_id", &self.instance_id)
            .field("seed", &self.seed)
            .field("configured", &self.options.get().is_some())
            .field("store_open", &self.store.initialized())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Something a scope owns and disposes when the scope ends.
#[async_trait]
pub trait ScopedInstance: Send + Sync {
    /// # Errors
    /// Returns the error raised while releasing resources.
    async fn dispose_scoped(&self) -> Result<()>;
}

#[async_trait]
impl<C: ConfigureContext> ScopedInstance for DbContext<C> {
    async fn dispose_scoped(&self) -> Result<()> {
        self.dispose().await
    }
}
