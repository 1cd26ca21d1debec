#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::bring_up_sqlite;
use dbctx::{
    ConfigureContext, ContextError, DataSettings, DbContext, OptionsBuilder, Ownership, Record,
    RelationalConnection, SeedInput, ServiceCollection,
};
use dbctx_inmemory::{InMemoryBuilderExt, InMemoryServicesExt};
use dbctx_sqlite::{SqliteBuilderExt, SqliteConnection, SqliteServicesExt};

/// Selects SQLite when `use_sqlite` is set before first use, the in-memory store otherwise.
#[derive(Default)]
struct Customers {
    use_sqlite: AtomicBool,
    connection_string: parking_lot::Mutex<String>,
}

impl ConfigureContext for Customers {
    fn on_configuring(&self, builder: &mut OptionsBuilder, _seed: &SeedInput) {
        if self.use_sqlite.load(Ordering::SeqCst) {
            builder.use_sqlite(&self.connection_string.lock());
        } else {
            builder.use_in_memory_database("customers-fallback");
        }
    }
}

/// Takes its connection from the seed.
#[derive(Default)]
struct Orders;

impl ConfigureContext for Orders {
    fn on_configuring(&self, builder: &mut OptionsBuilder, seed: &SeedInput) {
        match seed {
            SeedInput::ConnectionString(cs) => {
                builder.use_sqlite(cs);
            }
            SeedInput::Connection {
                connection,
                ownership,
            } => {
                builder.use_sqlite_connection(Arc::clone(connection), *ownership);
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn flag_selects_sqlite_or_in_memory_per_scope() {
    let db = bring_up_sqlite(3).await.unwrap();

    let mut services = ServiceCollection::new();
    services
        .add_sqlite_provider()
        .add_in_memory_provider()
        .add_db_context::<Customers>();
    let provider = services.build();

    let sqlite_scope = provider.create_scope();
    let on_disk = sqlite_scope.resolve::<Customers>().unwrap();
    *on_disk.config().connection_string.lock() = db.url.clone();
    on_disk.config().use_sqlite.store(true, Ordering::SeqCst);

    let memory_scope = provider.create_scope();
    let in_memory = memory_scope.resolve::<Customers>().unwrap();

    let from_sqlite = on_disk.query("customers").await.unwrap();
    let from_memory = in_memory.query("customers").await.unwrap();
    assert_eq!(from_sqlite.len(), db.rows);
    assert_eq!(from_sqlite[0].payload["name"], "Customer 0");
    assert!(from_memory.is_empty());

    assert_eq!(on_disk.provider_name().unwrap(), "sqlite");
    assert_eq!(in_memory.provider_name().unwrap(), "in-memory");

    sqlite_scope.dispose().await.unwrap();
    memory_scope.dispose().await.unwrap();
}

#[tokio::test]
async fn both_capabilities_registered_still_need_a_selection() {
    let mut services = ServiceCollection::new();
    services
        .add_sqlite_provider()
        .add_in_memory_provider()
        .add_db_context::<Orders>();
    let provider = services.build();
    assert_eq!(
        provider.registry().capabilities(),
        vec!["in-memory", "sqlite"]
    );

    let scope = provider.create_scope();
    let err = scope.resolve::<Orders>().unwrap().query("orders").await.unwrap_err();
    assert!(matches!(err, ContextError::NoDataStoreConfigured { .. }));
    scope.dispose().await.unwrap();
}

#[tokio::test]
async fn named_connection_string_reaches_sqlite() {
    let db = bring_up_sqlite(2).await.unwrap();

    let mut services = ServiceCollection::new();
    services
        .add_sqlite_provider()
        .add_settings(DataSettings::default().with_connection_string("Shop", db.url.clone()))
        .add_db_context_with::<Orders, _>(|registry| {
            let cs = registry.settings()?.connection_string("Shop")?;
            Ok((Orders, SeedInput::connection_string(cs)))
        });
    let provider = services.build();

    let scope = provider.create_scope();
    let ctx = scope.resolve::<Orders>().unwrap();
    assert_eq!(ctx.query("customers").await.unwrap().len(), 2);

    ctx.ensure_created("orders").await.unwrap();
    ctx.upsert("orders", &[Record::new("o-1", serde_json::json!({ "customer": "C000" }))])
        .await
        .unwrap();
    scope.dispose().await.unwrap();

    // A fresh scope opens a fresh connection and sees the committed row.
    let next = provider.create_scope();
    let rows = next.resolve::<Orders>().unwrap().query("orders").await.unwrap();
    assert_eq!(rows.len(), 1);
    next.dispose().await.unwrap();
}

#[tokio::test]
async fn borrowed_connection_outlives_the_context() {
    let db = bring_up_sqlite(1).await.unwrap();
    let conn = SqliteConnection::connect(&db.url).await.unwrap();

    let ctx = DbContext::with_seed(
        Orders,
        SeedInput::connection(conn.clone(), Ownership::Borrowed),
    );
    assert_eq!(ctx.query("customers").await.unwrap().len(), 1);
    ctx.dispose().await.unwrap();

    assert!(conn.is_open());
    assert_eq!(conn.fetch_all("customers").await.unwrap().len(), 1);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn transferred_connection_is_closed_with_the_context() {
    let db = bring_up_sqlite(1).await.unwrap();
    let conn = Arc::new(SqliteConnection::new(&db.url).unwrap());

    let ctx = DbContext::with_seed(
        Orders,
        SeedInput::connection(conn.clone(), Ownership::Transferred),
    );
    assert_eq!(ctx.query("customers").await.unwrap().len(), 1);
    assert!(conn.is_open());

    ctx.dispose().await.unwrap();
    assert!(!conn.is_open());
}

#[tokio::test]
async fn missing_table_is_a_backend_error() {
    let ctx = DbContext::with_seed(Orders, SeedInput::connection_string("sqlite::memory:"));
    let err = ctx.query("invoices").await.unwrap_err();
    assert!(matches!(
        err,
        ContextError::Store(dbctx::StoreError::Backend {
            provider: "sqlite",
            ..
        })
    ));
    ctx.dispose().await.unwrap();
}
