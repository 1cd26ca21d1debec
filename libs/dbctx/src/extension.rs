//! Provider-specific configuration fragments and the registry that holds them.
//!
//! An extension is keyed by its concrete Rust type: two values of the same type are the
//! same *kind*, and adding the second one replaces the first. The registry never hands out
//! mutable access; every change produces a new registry.
//!
//! Implementation details:
//! - Key = `TypeId` of the concrete extension, with `type_name` kept for diagnostics.
//! - Value = one `Arc` seen three ways (as `dyn Any` for typed reads, as
//!   `dyn OptionsExtension` for iteration and as `dyn ProviderExtension` when the
//!   extension describes a data store). All three point at the same allocation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ContextError;
use crate::options::ContextOptions;
use crate::services::ServiceRegistry;
use crate::store::{StoreError, StoreLease};

/// Stable identity of an extension kind.
#[derive(Clone, Copy)]
pub struct ExtensionKey {
    id: TypeId,
    name: &'static str,
}

impl ExtensionKey {
    #[inline]
    #[must_use]
    pub fn of<E: OptionsExtension>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// Fully-qualified type name of the extension kind.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ExtensionKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExtensionKey {}

impl std::hash::Hash for ExtensionKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Static description of an extension. Whether it describes a data store is decided by
/// [`OptionsExtension::as_provider`] alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// Short stable name, e.g. `"sqlite"` or `"core"`.
    pub name: &'static str,
}

/// A configuration fragment attached to [`ContextOptions`].
pub trait OptionsExtension: fmt::Debug + Send + Sync + 'static {
    fn info(&self) -> ExtensionInfo;

    /// Short description used in debug logs. Must not leak secrets unless
    /// `sensitive` is set.
    fn log_fragment(&self, sensitive: bool) -> String {
        let _ = sensitive;
        self.info().name.to_owned()
    }

    /// Provider view of this extension; `None` for plain settings.
    fn as_provider(self: Arc<Self>) -> Option<Arc<dyn ProviderExtension>> {
        None
    }

    /// Checks the finished snapshot after the configuration hook ran.
    ///
    /// # Errors
    /// Returns `ContextError::InvalidConfiguration` when the snapshot is unusable.
    fn validate(&self, options: &ContextOptions) -> Result<(), ContextError> {
        let _ = options;
        Ok(())
    }
}

/// Extension that knows how to reach one storage backend.
#[async_trait]
pub trait ProviderExtension: fmt::Debug + Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Open (or attach to) the backing store.
    ///
    /// The returned lease says whether the caller owns the store's resources and has to
    /// release them when it is done.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend cannot be reached. Resources created before the
    /// failure are released before returning.
    async fn open_store(&self, services: &ServiceRegistry) -> Result<StoreLease, StoreError>;
}

#[derive(Clone)]
struct ExtensionEntry {
    any: Arc<dyn Any + Send + Sync>,
    extension: Arc<dyn OptionsExtension>,
    provider: Option<Arc<dyn ProviderExtension>>,
}

impl ExtensionEntry {
    fn new<E: OptionsExtension>(extension: Arc<E>) -> Self {
        let provider = Arc::clone(&extension).as_provider();
        let any: Arc<dyn Any + Send + Sync> = Arc::clone(&extension) as _;
        Self {
            any,
            extension,
            provider,
        }
    }
}

/// Map from extension kind to extension. At most one entry per kind.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    entries: HashMap<ExtensionKey, ExtensionEntry>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this registry with `extension` set for its kind.
    #[must_use]
    pub fn with<E: OptionsExtension>(&self, extension: Arc<E>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(ExtensionKey::of::<E>(), ExtensionEntry::new(extension));
        Self { entries }
    }

    #[must_use]
    pub fn get<E: OptionsExtension>(&self) -> Option<Arc<E>> {
        let entry = self.entries.get(&ExtensionKey::of::<E>())?;
        Arc::clone(&entry.any).downcast::<E>().ok()
    }

    #[must_use]
    pub fn contains<E: OptionsExtension>(&self) -> bool {
        self.entries.contains_key(&ExtensionKey::of::<E>())
    }

    #[must_use]
    pub fn contains_key(&self, key: &ExtensionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExtensionKey, &Arc<dyn OptionsExtension>)> {
        self.entries.iter().map(|(k, e)| (k, &e.extension))
    }

    /// Every extension that describes a data store.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn ProviderExtension>> {
        self.entries.values().filter_map(|e| e.provider.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
