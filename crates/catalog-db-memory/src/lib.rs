//! In-memory document store for the catalog server.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `catalog-storage`.
//!
//! # Example
//!
//! ```ignore
//! use catalog_db_memory::InMemoryStore;
//! use catalog_storage::{DocumentStore, Filter};
//!
//! let store = InMemoryStore::new();
//! store.ensure_unique_index("categories", "categoryName").await?;
//! store.insert("categories", json!({"categoryName": "Antibiotics"})).await?;
//! ```

pub mod query;
pub mod storage;

pub use catalog_storage::{DocumentStore, DynStore, StorageError};
pub use storage::InMemoryStore;

/// Creates a new shareable in-memory store.
pub fn create_store() -> DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
