#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Database context configuration and provider selection.
//!
//! A *context kind* is a Rust type implementing [`ConfigureContext`]. Each
//! [`DbContext`] instance resolves its configuration lazily: on the first operation that
//! needs it, the context seeds an [`OptionsBuilder`] with whatever [`ContextOptions`] it was
//! constructed with (or an empty snapshot), runs the hook once, and selects the single
//! provider extension present on the result with [`ProviderSelector`].
//!
//! Snapshots are immutable and shared as `Arc<ContextOptions>`; the builder produces a new
//! snapshot on every change. Scopes ([`Scope`]) cache at most one context per kind and
//! dispose them together.
//!
//! # Example
//! ```rust
//! use dbctx::{ConfigureContext, ContextError, DbContext, OptionsBuilder, SeedInput};
//!
//! #[derive(Default)]
//! struct ReportingContext;
//!
//! impl ConfigureContext for ReportingContext {
//!     fn on_configuring(&self, _builder: &mut OptionsBuilder, _seed: &SeedInput) {}
//! }
//!
//! // Construction always succeeds; the missing provider is reported on first use.
//! let ctx = DbContext::new(ReportingContext);
//! assert!(matches!(
//!     ctx.provider_name(),
//!     Err(ContextError::NoDataStoreConfigured { .. })
//! ));
//! ```

// Core modules
pub mod builder;
pub mod context;
pub mod error;
pub mod extension;
pub mod hook;
pub mod options;
pub mod relational;
pub mod scope;
pub mod selector;
pub mod services;
pub mod settings;
pub mod store;

pub use builder::OptionsBuilder;
pub use context::{DbContext, ScopedInstance};
pub use error::{ContextError, Result};
pub use extension::{
    ExtensionInfo, ExtensionKey, ExtensionRegistry, OptionsExtension, ProviderExtension,
};
pub use hook::{ConfigureContext, Ownership, SeedInput};
pub use options::{ContextOptions, ContextType, CoreOptionsExtension};
pub use relational::{
    ConnectionFactory, ConnectionSource, RelationalConnection, RelationalOptionsExtension,
};
pub use scope::{Scope, ScopeCache, ServiceCollection, ServiceProvider};
pub use selector::ProviderSelector;
pub use services::{ServiceError, ServiceRegistry};
pub use settings::{DataSettings, SettingsError, redact_connection_string};
pub use store::{DataStore, Record, StoreError, StoreLease, validate_entity_set};
