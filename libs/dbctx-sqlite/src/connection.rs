//! SQLite connection over a single-connection sqlx pool.
//!
//! Each entity set is a table `(id TEXT PRIMARY KEY, payload TEXT)` holding the record key
//! and its JSON payload.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dbctx::{
    ConnectionFactory, Record, RelationalConnection, StoreError, redact_connection_string,
    validate_entity_set,
};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// Provider name reported by SQLite stores.
pub const PROVIDER_NAME: &str = "sqlite";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::backend(PROVIDER_NAME, err)
}

/// Turn a connection string into a sqlx URL.
///
/// Accepts sqlx URLs (`sqlite://file.db`, `sqlite::memory:`) and `Data Source=<path>`
/// pairs, where `:memory:` names a private in-memory database.
fn to_sqlx_url(connection_string: &str) -> Result<String, StoreError> {
    let s = connection_string.trim();
    if s.starts_with("sqlite:") {
        return Ok(s.to_owned());
    }

    let source = s.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        matches!(key.as_str(), "data source" | "datasource" | "filename").then_some(value.trim())
    });

    match source {
        Some(":memory:") => Ok("sqlite::memory:".to_owned()),
        Some(path) if !path.is_empty() => Ok(format!("sqlite://{path}")),
        _ => Err(backend(sqlx::Error::Configuration(
            format!(
                "unrecognised sqlite connection string '{}'",
                redact_connection_string(s)
            )
            .into(),
        ))),
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// A SQLite database reached through a one-connection pool.
///
/// The pool is created by [`open`](RelationalConnection::open) and dropped by
/// [`close`](RelationalConnection::close); an in-memory database lives exactly as long as
/// the pool. Cloned `Arc`s of one connection share the same pool.
pub struct SqliteConnection {
    connection_string: String,
    options: SqliteConnectOptions,
    pool: ArcSwapOption<SqlitePool>,
    open_lock: tokio::sync::Mutex<()>,
}

impl SqliteConnection {
    /// Build a closed connection.
    ///
    /// # Errors
    /// Returns `StoreError::Backend` if the connection string cannot be parsed.
    pub fn new(connection_string: &str) -> Result<Self, StoreError> {
        let url = to_sqlx_url(connection_string)?;
        let memory = is_memory_url(&url);

        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(backend)?
            .create_if_missing(true);
        options = if memory {
            options.journal_mode(SqliteJournalMode::Delete)
        } else {
            options
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(DEFAULT_BUSY_TIMEOUT)
        };

        Ok(Self {
            connection_string: connection_string.to_owned(),
            options,
            pool: ArcSwapOption::empty(),
            open_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Open a connection in one step.
    ///
    /// # Errors
    /// Returns `StoreError::Backend` if parsing or connecting fails.
    pub async fn connect(connection_string: &str) -> Result<Arc<Self>, StoreError> {
        let conn = Arc::new(Self::new(connection_string)?);
        conn.open().await?;
        Ok(conn)
    }

    /// The live pool, if open.
    #[must_use]
    pub fn pool(&self) -> Option<Arc<SqlitePool>> {
        self.pool.load_full()
    }

    fn live_pool(&self) -> Result<Arc<SqlitePool>, StoreError> {
        self.pool().ok_or(StoreError::ConnectionClosed)
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field(
                "connection_string",
                &redact_connection_string(&self.connection_string),
            )
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RelationalConnection for SqliteConnection {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn is_open(&self) -> bool {
        self.pool.load().is_some()
    }

    async fn open(&self) -> Result<(), StoreError> {
        let _guard = self.open_lock.lock().await;
        if self.is_open() {
            return Ok(());
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(self.options.clone())
            .await
            .map_err(backend)?;
        self.pool.store(Some(Arc::new(pool)));

        tracing::debug!(
            connection_string = %redact_connection_string(&self.connection_string),
            "Opened sqlite connection"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let _guard = self.open_lock.lock().await;
        if let Some(pool) = self.pool.swap(None) {
            pool.close().await;
            tracing::debug!(
                connection_string = %redact_connection_string(&self.connection_string),
                "Closed sqlite connection"
            );
        }
        Ok(())
    }

    async fn ensure_table(&self, table: &str) -> Result<bool, StoreError> {
        validate_entity_set(table)?;
        let pool = self.live_pool()?;
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(pool.as_ref())
                .await
                .map_err(backend)?;
        if existing > 0 {
            return Ok(false);
        }

        let stmt = format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (id TEXT PRIMARY KEY NOT NULL, payload TEXT NOT NULL)"#
        );
        sqlx::query(&stmt)
            .execute(pool.as_ref())
            .await
            .map_err(backend)?;
        Ok(true)
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        validate_entity_set(table)?;
        let pool = self.live_pool()?;
        let stmt = format!(r#"SELECT id, payload FROM "{table}" ORDER BY id"#);
        let rows: Vec<(String, String)> = sqlx::query_as(&stmt)
            .fetch_all(pool.as_ref())
            .await
            .map_err(backend)?;

        rows.into_iter()
            .map(|(id, payload)| Ok::<_, StoreError>(Record::new(id, serde_json::from_str(&payload)?)))
            .collect()
    }

    async fn upsert(&self, table: &str, records: &[Record]) -> Result<usize, StoreError> {
        validate_entity_set(table)?;
        let pool = self.live_pool()?;
        let stmt = format!(
            r#"INSERT INTO "{table}" (id, payload) VALUES (?, ?)
               ON CONFLICT(id) DO UPDATE SET payload = excluded.payload"#
        );

        let mut tx = pool.begin().await.map_err(backend)?;
        for record in records {
            let payload = serde_json::to_string(&record.payload)?;
            sqlx::query(&stmt)
                .bind(&record.key)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(records.len())
    }
}

/// Creates [`SqliteConnection`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteConnectionFactory;

impl ConnectionFactory for SqliteConnectionFactory {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn create(
        &self,
        connection_string: &str,
    ) -> Result<Arc<dyn RelationalConnection>, StoreError> {
        Ok(Arc::new(SqliteConnection::new(connection_string)?))
    }
}
