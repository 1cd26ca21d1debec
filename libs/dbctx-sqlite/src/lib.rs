#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! SQLite provider for `dbctx`, backed by sqlx.
//!
//! ```no_run
//! use dbctx::{ConfigureContext, OptionsBuilder, SeedInput};
//! use dbctx_sqlite::SqliteBuilderExt;
//!
//! struct ShopContext;
//!
//! impl ConfigureContext for ShopContext {
//!     fn on_configuring(&self, builder: &mut OptionsBuilder, seed: &SeedInput) {
//!         let cs = seed.as_connection_string().unwrap_or("sqlite://shop.db");
//!         builder.use_sqlite(cs);
//!     }
//! }
//! ```

pub mod builder_ext;
pub mod connection;

pub use builder_ext::{SqliteBuilderExt, SqliteOptionsExtension, SqliteServicesExt};
pub use connection::{PROVIDER_NAME, SqliteConnection, SqliteConnectionFactory};
