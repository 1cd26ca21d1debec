#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! In-memory data store provider for `dbctx`.
//!
//! Contexts select it with [`InMemoryBuilderExt::use_in_memory_database`]. Databases are
//! named; contexts naming the same database through the same [`InMemoryDatabaseRoot`]
//! share its data.

pub mod builder_ext;
pub mod database;
pub mod extension;

pub use builder_ext::{InMemoryBuilderExt, InMemoryServicesExt};
pub use database::{InMemoryDatabase, InMemoryDatabaseRoot};
pub use extension::{InMemoryOptionsExtension, PROVIDER_NAME};
