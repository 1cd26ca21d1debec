//! Per-context configuration hook and the inputs it is seeded with.

use std::fmt;
use std::sync::Arc;

use crate::builder::OptionsBuilder;
use crate::options::ContextOptions;
use crate::relational::RelationalConnection;

/// The customization point every context kind implements.
///
/// `on_configuring` receives a builder seeded with the externally supplied snapshot (or an
/// empty one) and may call `add_or_update_extension` any number of times; the last write
/// per kind wins. It runs lazily, at most once per context instance, and must not do I/O.
///
/// ```
/// use dbctx::{ConfigureContext, OptionsBuilder, SeedInput};
///
/// #[derive(Default)]
/// struct AuditContext;
///
/// impl ConfigureContext for AuditContext {
///     fn on_configuring(&self, builder: &mut OptionsBuilder, _seed: &SeedInput) {
///         if !builder.is_configured() {
///             builder.enable_detailed_errors();
///         }
///     }
/// }
/// ```
pub trait ConfigureContext: Send + Sync + 'static {
    fn on_configuring(&self, builder: &mut OptionsBuilder, seed: &SeedInput);
}

/// Who releases a connection handed to a context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ownership {
    /// The caller keeps ownership; the context never closes the connection.
    #[default]
    Borrowed,
    /// Ownership moves to the context, which closes the connection on dispose.
    Transferred,
}

/// What a context was constructed with.
#[derive(Clone, Default)]
pub enum SeedInput {
    /// Nothing supplied; the hook decides everything.
    #[default]
    Empty,
    /// An externally built snapshot; the builder starts from it.
    Options(Arc<ContextOptions>),
    /// A raw connection string for the hook to use.
    ConnectionString(String),
    /// A live connection for the hook to use.
    Connection {
        connection: Arc<dyn RelationalConnection>,
        ownership: Ownership,
    },
}

impl SeedInput {
    #[must_use]
    pub fn options(options: Arc<ContextOptions>) -> Self {
        Self::Options(options)
    }

    #[must_use]
    pub fn connection_string(value: impl Into<String>) -> Self {
        Self::ConnectionString(value.into())
    }

    #[must_use]
    pub fn connection(connection: Arc<dyn RelationalConnection>, ownership: Ownership) -> Self {
        Self::Connection {
            connection,
            ownership,
        }
    }

    /// The seeded snapshot, if one was supplied.
    #[must_use]
    pub fn as_options(&self) -> Option<&Arc<ContextOptions>> {
        match self {
            Self::Options(opts) => Some(opts),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_connection_string(&self) -> Option<&str> {
        match self {
            Self::ConnectionString(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Options(_) => "options",
            Self::ConnectionString(_) => "connection_string",
            Self::Connection { .. } => "connection",
        }
    }
}

impl fmt::Debug for SeedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Options(opts) => f.debug_tuple("Options").field(opts).finish(),
            // Connection strings may carry credentials.
            Self::ConnectionString(_) => f.write_str("ConnectionString(<redacted>)"),
            Self::Connection { ownership, .. } => f
                .debug_struct("Connection")
                .field("ownership", ownership)
                .finish_non_exhaustive(),
        }
    }
}
