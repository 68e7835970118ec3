//! Cache Module
//!
//! Provides the generic in-memory TTL cache with negative caching that every
//! repository, the rate limiter and the token store are built on.

mod entry;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, Lookup, Slot};
pub use stats::CacheStats;
pub use store::TtlCache;

use std::hash::Hash;

// == Sweep ==
/// A structure whose expired entries can be purged by the background sweep.
pub trait Sweep: Send + Sync {
    /// Label used in sweep logs.
    fn label(&self) -> &'static str;

    /// Removes expired entries, returning how many were dropped.
    fn sweep_expired(&self) -> usize;
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn label(&self) -> &'static str {
        self.name()
    }

    fn sweep_expired(&self) -> usize {
        self.cleanup_expired()
    }
}
