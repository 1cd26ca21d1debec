//! The narrow contract a storage backend implements.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stored row: a key and an opaque JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub payload: serde_json::Value,
}

impl Record {
    #[must_use]
    pub fn new(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid entity set name '{0}'")]
    InvalidEntitySet(String),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{provider} backend error: {source}")]
    Backend {
        provider: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    #[must_use]
    pub fn backend<E>(provider: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            provider,
            source: Box::new(err),
        }
    }
}

/// Storage backend as seen by a context.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Create the entity set if missing. Returns `true` when it was created.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend rejects the request.
    async fn ensure_created(&self, entity_set: &str) -> Result<bool, StoreError>;

    /// All records of an entity set, ordered by key.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend rejects the request.
    async fn query(&self, entity_set: &str) -> Result<Vec<Record>, StoreError>;

    /// Insert or replace records by key. Returns the number of records written.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend rejects the request.
    async fn upsert(&self, entity_set: &str, records: &[Record]) -> Result<usize, StoreError>;

    /// Release resources held by this store. Only called by the owner of the lease.
    ///
    /// # Errors
    /// Returns `StoreError` if releasing fails; the store is unusable afterwards either way.
    async fn release(&self) -> Result<(), StoreError>;
}

/// An opened store plus who is responsible for releasing it.
#[derive(Clone)]
pub struct StoreLease {
    store: Arc<dyn DataStore>,
    owned: bool,
}

impl StoreLease {
    /// Lease whose resources the holder must release.
    #[must_use]
    pub fn owned(store: Arc<dyn DataStore>) -> Self {
        Self { store, owned: true }
    }

    /// Lease over resources someone else releases.
    #[must_use]
    pub fn borrowed(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            owned: false,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl fmt::Debug for StoreLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLease")
            .field("provider", &self.store.provider_name())
            .field("owned", &self.owned)
            .finish()
    }
}

/// Entity set names end up as table names, so only plain identifiers are accepted.
///
/// # Errors
/// Returns `StoreError::InvalidEntitySet` for anything but `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_entity_set(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidEntitySet(name.to_owned()))
    }
}
