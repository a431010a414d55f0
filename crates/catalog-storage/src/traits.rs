//! Storage traits for the document storage layer.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::types::{Filter, FindOptions};

/// Contract every document store backend implements.
///
/// Documents are JSON objects grouped into named collections. Collections
/// are created on first use. Implementations must be thread-safe
/// (`Send + Sync`); every write is atomic per document.
///
/// # Example
///
/// ```ignore
/// use catalog_storage::{DocumentStore, Filter, StorageError};
///
/// async fn find_category(store: &dyn DocumentStore, id: &str) -> Result<Option<Value>, StorageError> {
///     store.find_one("categories", &Filter::eq("categoryId", id)).await
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Declares a unique index on `field` of `collection`.
    ///
    /// Idempotent. Later writes that would duplicate a value fail with
    /// `StorageError::DuplicateKey`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` if existing documents already
    /// violate the index.
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StorageError>;

    /// Inserts a document and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` on a unique index violation and
    /// `StorageError::InvalidDocument` if `document` is not an object.
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StorageError>;

    /// Returns matching documents, ordered and windowed by `options`.
    ///
    /// Without a sort key documents come back in insertion order.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StorageError>;

    /// Returns the first matching document in insertion order.
    async fn find_one(&self, collection: &str, filter: &Filter)
    -> Result<Option<Value>, StorageError>;

    /// Counts matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError>;

    /// Merges `changes` into the first matching document and returns the
    /// updated document, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` if the change violates a unique
    /// index; the stored document is left untouched.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError>;

    /// Merges `changes` into every matching document and returns how many
    /// documents matched.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> Result<u64, StorageError>;

    /// Removes the first matching document and returns it.
    async fn delete_one(&self, collection: &str, filter: &Filter)
    -> Result<Option<Value>, StorageError>;

    /// Returns up to `size` matching documents chosen uniformly at random.
    async fn sample(
        &self,
        collection: &str,
        filter: &Filter,
        size: usize,
    ) -> Result<Vec<Value>, StorageError>;

    /// Returns the string values of `field` across the whole collection.
    ///
    /// Documents where the field is missing or not a string are skipped.
    async fn field_values(&self, collection: &str, field: &str) -> Result<Vec<String>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
