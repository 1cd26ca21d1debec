//! Copy-on-write builder over [`ContextOptions`].

use std::sync::Arc;

use crate::extension::OptionsExtension;
use crate::options::{ContextOptions, CoreOptionsExtension};

/// Builds options snapshots without mutating the ones it was given.
///
/// Every `add_or_update_extension` replaces the held snapshot with a freshly allocated one,
/// so a caller that kept the seed `Arc` can still compare it (by identity or by content)
/// after the builder moved on:
///
/// ```
/// use std::sync::Arc;
/// use dbctx::{ContextOptions, CoreOptionsExtension, OptionsBuilder};
///
/// let seed = Arc::new(ContextOptions::new());
/// let mut builder = OptionsBuilder::new(Arc::clone(&seed));
/// assert!(Arc::ptr_eq(&seed, builder.options()));
///
/// builder.add_or_update_extension(CoreOptionsExtension::default());
/// assert!(!Arc::ptr_eq(&seed, builder.options()));
/// assert!(seed.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct OptionsBuilder {
    options: Arc<ContextOptions>,
}

impl OptionsBuilder {
    #[must_use]
    pub fn new(seed: Arc<ContextOptions>) -> Self {
        Self { options: seed }
    }

    /// Builder seeded with an empty snapshot tagged for `C`.
    #[must_use]
    pub fn for_context<C: 'static>() -> Self {
        Self::new(Arc::new(ContextOptions::for_context::<C>()))
    }

    /// Set `extension` for its kind on a new snapshot and hold that snapshot.
    pub fn add_or_update_extension<E: OptionsExtension>(&mut self, extension: E) -> &mut Self {
        self.options = Arc::new(self.options.with_extension(extension));
        self
    }

    /// The snapshot currently held.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &Arc<ContextOptions> {
        &self.options
    }

    /// `true` once a data store extension was added (or was in the seed).
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.options.is_configured()
    }

    #[must_use]
    pub fn into_options(self) -> Arc<ContextOptions> {
        self.options
    }

    pub fn enable_sensitive_data_logging(&mut self) -> &mut Self {
        let core = CoreOptionsExtension {
            sensitive_data_logging: true,
            ..self.options.core()
        };
        self.add_or_update_extension(core)
    }

    pub fn enable_detailed_errors(&mut self) -> &mut Self {
        let core = CoreOptionsExtension {
            detailed_errors: true,
            ..self.options.core()
        };
        self.add_or_update_extension(core)
    }
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new(Arc::new(ContextOptions::new()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn core_switches_accumulate() {
        let mut builder = OptionsBuilder::default();
        builder
            .enable_sensitive_data_logging()
            .enable_detailed_errors();

        let core = builder.options().core();
        assert!(core.sensitive_data_logging);
        assert!(core.detailed_errors);
        assert_eq!(builder.options().len(), 1);
    }

    #[test]
    fn every_add_allocates_a_new_snapshot() {
        let mut builder = OptionsBuilder::default();
        builder.enable_detailed_errors();
        let first = Arc::clone(builder.options());

        // Same content written again still yields a distinct snapshot.
        builder.enable_detailed_errors();
        assert!(!Arc::ptr_eq(&first, builder.options()));
        assert_eq!(first.core(), builder.options().core());
    }
}
