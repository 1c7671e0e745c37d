//! Versioned content cache: named generations of request→response entries.

mod store;

pub use store::{CacheStore, MemoryCacheStore, SqliteCacheStore};
