//! # catalog-storage
//!
//! Storage abstraction layer for the catalog server.
//!
//! This crate defines the traits and types that storage backends implement.
//! It does not contain any implementations; those live in separate crates.
//!
//! The main trait is [`DocumentStore`]: named collections of JSON objects
//! with unique indexes, filtered and sorted finds, partial updates and
//! random sampling.

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::DocumentStore;
pub use types::{Filter, FindOptions, SortParam};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStore = std::sync::Arc<dyn DocumentStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::DocumentStore;
    pub use crate::types::{Filter, FindOptions, SortParam};
    pub use crate::{DynStore, StorageResult};
}
