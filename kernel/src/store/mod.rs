//! SQLite-backed entity store.

/// Schema creation.
pub mod schema;
/// `EntityStore` implementation.
pub mod sqlite;

pub use sqlite::{SqlStoreError, SqliteEntityStore};

#[cfg(test)]
mod integration_tests;
