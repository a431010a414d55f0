//! Per-manager list caching.
//!
//! Each resource manager owns one [`ListCache`]. List reads fill it on a
//! miss; every write sweeps it by tag so the next read goes back to storage.
//!
//! ```text
//! GET list → ListCache (DashMap, TTL) → DocumentStore
//! write    → DocumentStore → ListCache::invalidate([list tag, "page:"])
//! ```

pub mod backend;
pub mod key;

pub use backend::{CacheStats, CachedEntry, ListCache};
pub use key::{ListQuery, PAGE_TAG, full_list_key, paged_key, write_tags};
