//! Picks the single active data store extension of a finished snapshot.

use std::sync::Arc;

use crate::error::{ContextError, Result};
use crate::extension::ProviderExtension;
use crate::options::ContextOptions;

/// Provider selection by extension presence.
///
/// Only extensions on the snapshot count. Capabilities registered with the service
/// collection make services available but never choose a provider.
pub struct ProviderSelector;

impl ProviderSelector {
    /// Returns the one provider extension present on `options`.
    ///
    /// # Errors
    /// - `ContextError::NoDataStoreConfigured` when there is none.
    /// - `ContextError::MultipleDataStoresConfigured` when more than one kind is present.
    pub fn resolve(options: &ContextOptions) -> Result<Arc<dyn ProviderExtension>> {
        let mut providers = options.providers();
        let Some(first) = providers.next() else {
            return Err(ContextError::NoDataStoreConfigured {
                context: context_label(options),
            });
        };

        if providers.next().is_some() {
            let mut names: Vec<&'static str> =
                options.providers().map(|p| p.provider_name()).collect();
            names.sort_unstable();
            return Err(ContextError::MultipleDataStoresConfigured {
                context: context_label(options),
                providers: names,
            });
        }

        tracing::debug!(
            context = %context_label(options),
            provider = first.provider_name(),
            "Selected data store provider"
        );
        Ok(Arc::clone(first))
    }
}

fn context_label(options: &ContextOptions) -> String {
    options
        .context_type()
        .map_or_else(|| "<untyped>".to_owned(), |t| t.short_name().to_owned())
}
