use thiserror::Error;

use crate::services::ServiceError;
use crate::settings::SettingsError;
use crate::store::StoreError;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Typed error for context configuration, resolution and data access.
///
/// Configuration errors are setup defects, never transient; they surface on the first
/// operation that needed the resolved configuration and are not retried.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(
        "no data store provider is configured for context '{context}'; \
         add a provider extension in `on_configuring` or register options for the context"
    )]
    NoDataStoreConfigured { context: String },

    #[error("context '{context}' has more than one data store provider configured: {providers:?}")]
    MultipleDataStoresConfigured {
        context: String,
        providers: Vec<&'static str>,
    },

    #[error("{target} used after it was disposed")]
    UseAfterDispose { target: String },

    #[error("options built for context '{expected}' were supplied to context '{actual}'")]
    OptionsContextMismatch { expected: String, actual: String },

    #[error("context '{0}' is not registered with the service collection")]
    ContextNotRegistered(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ContextError {
    pub(crate) fn disposed(target: impl Into<String>) -> Self {
        Self::UseAfterDispose {
            target: target.into(),
        }
    }
}
