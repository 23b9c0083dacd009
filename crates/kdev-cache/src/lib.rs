//! Resource cache for kdev
//!
//! Listings of contexts, namespaces and pods are kept in a single JSON
//! document on disk. Entries never expire on their own; callers refresh or
//! invalidate them explicitly.

mod store;

pub use store::{CACHE_FILE_NAME, ResourceCache};

// Re-export types used in our public API
pub use kdev_types::{CacheEntry, CacheKey, KdevError, Result};
