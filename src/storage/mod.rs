//! Storage backends for provenance ledgers
//!
//! Ledgers are persisted through the `LedgerStore` trait.
//! The primary implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{LedgerStore, OpenStore, StorageError, StorageResult};
