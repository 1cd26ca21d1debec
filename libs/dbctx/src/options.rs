//! Immutable options snapshots.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::extension::{
    ExtensionInfo, ExtensionKey, ExtensionRegistry, OptionsExtension, ProviderExtension,
};

/// Identity of a context kind (the Rust type implementing
/// [`ConfigureContext`](crate::ConfigureContext)).
#[derive(Clone, Copy)]
pub struct ContextType {
    id: TypeId,
    name: &'static str,
}

impl ContextType {
    #[inline]
    #[must_use]
    pub fn of<C: 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unqualified type name, used in log lines and error messages.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for ContextType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContextType {}

impl std::hash::Hash for ContextType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Frozen bundle of extensions, optionally tagged with the context kind it was built for.
///
/// Always shared as `Arc<ContextOptions>`; identity comparisons use [`Arc::ptr_eq`].
/// Adding an extension never touches the receiver, it returns a new snapshot.
#[derive(Clone, Default)]
pub struct ContextOptions {
    context_type: Option<ContextType>,
    extensions: ExtensionRegistry,
}

impl ContextOptions {
    /// Empty snapshot not bound to any context kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty snapshot tagged for context kind `C`.
    #[must_use]
    pub fn for_context<C: 'static>() -> Self {
        Self {
            context_type: Some(ContextType::of::<C>()),
            extensions: ExtensionRegistry::new(),
        }
    }

    /// Same extensions, tagged for context kind `C`.
    #[must_use]
    pub fn tagged_for<C: 'static>(&self) -> Self {
        Self {
            context_type: Some(ContextType::of::<C>()),
            extensions: self.extensions.clone(),
        }
    }

    #[must_use]
    pub fn context_type(&self) -> Option<ContextType> {
        self.context_type
    }

    /// New snapshot with `extension` set for its kind; any previous value of that kind is
    /// replaced in the new snapshot only.
    #[must_use]
    pub fn with_extension<E: OptionsExtension>(&self, extension: E) -> Self {
        self.with_shared_extension(Arc::new(extension))
    }

    #[must_use]
    pub fn with_shared_extension<E: OptionsExtension>(&self, extension: Arc<E>) -> Self {
        Self {
            context_type: self.context_type,
            extensions: self.extensions.with(extension),
        }
    }

    #[must_use]
    pub fn extension<E: OptionsExtension>(&self) -> Option<Arc<E>> {
        self.extensions.get::<E>()
    }

    #[must_use]
    pub fn has_extension<E: OptionsExtension>(&self) -> bool {
        self.extensions.contains::<E>()
    }

    #[must_use]
    pub fn has_key(&self, key: &ExtensionKey) -> bool {
        self.extensions.contains_key(key)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &Arc<dyn OptionsExtension>> {
        self.extensions.iter().map(|(_, e)| e)
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn ProviderExtension>> {
        self.extensions.providers()
    }

    /// `true` once at least one data store extension is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.providers().next().is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Engine-wide switches, defaulted when no core extension was added.
    #[must_use]
    pub fn core(&self) -> CoreOptionsExtension {
        self.extension::<CoreOptionsExtension>()
            .map(|c| *c)
            .unwrap_or_default()
    }

    /// One-line description of every extension, sorted by name, for debug logs.
    #[must_use]
    pub fn describe(&self) -> String {
        let sensitive = self.core().sensitive_data_logging;
        let mut parts: Vec<String> = self
            .extensions()
            .map(|e| e.log_fragment(sensitive))
            .collect();
        parts.sort();
        parts.join(" ")
    }
}

impl fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOptions")
            .field("context_type", &self.context_type)
            .field("extensions", &self.extensions)
            .finish()
    }
}

/// Engine-wide switches that are not tied to a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreOptionsExtension {
    /// Log connection strings and record payloads without redaction.
    pub sensitive_data_logging: bool,
    /// Include provider names and entity sets in store error messages.
    pub detailed_errors: bool,
}

impl OptionsExtension for CoreOptionsExtension {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo { name: "core" }
    }

    fn log_fragment(&self, _sensitive: bool) -> String {
        let mut out = String::from("core");
        if self.sensitive_data_logging {
            out.push_str(" sensitive_data_logging");
        }
        if self.detailed_errors {
            out.push_str(" detailed_errors");
        }
        out
    }
}
