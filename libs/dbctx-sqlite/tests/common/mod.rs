#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tempfile::TempDir;

/// A SQLite file seeded with a `customers` table, removed when dropped.
pub struct DbUnderTest {
    pub url: String,
    pub rows: usize,
    _dir: TempDir,
}

/// Create a database file with `rows` customers, written through sqlx directly.
///
/// # Errors
/// Returns an error if the file cannot be created or seeded.
pub async fn bring_up_sqlite(rows: usize) -> Result<DbUnderTest> {
    let dir = TempDir::new()?;
    let path = dir.path().join("customers.db");
    let url = format!("sqlite://{}", path.display());

    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await?;
    sqlx::query(
        r#"CREATE TABLE "customers" (id TEXT PRIMARY KEY NOT NULL, payload TEXT NOT NULL)"#,
    )
    .execute(&mut conn)
    .await?;
    for i in 0..rows {
        let payload = serde_json::json!({ "name": format!("Customer {i}") }).to_string();
        sqlx::query(r#"INSERT INTO "customers" (id, payload) VALUES (?, ?)"#)
            .bind(format!("C{i:03}"))
            .bind(payload)
            .execute(&mut conn)
            .await?;
    }
    conn.close().await?;

    Ok(DbUnderTest {
        url,
        rows,
        _dir: dir,
    })
}
