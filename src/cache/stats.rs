//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses and negative hits.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered with a real value
    pub hits: u64,
    /// Lookups answered from a negative marker
    pub negative_hits: u64,
    /// Lookups that found nothing live
    pub misses: u64,
    /// Entries removed by the sweep
    pub swept: u64,
    /// Current number of entries in the cache (expired ones included until swept)
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate, counting negative hits as hits.
    ///
    /// Returns 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let answered = self.hits + self.negative_hits;
        let total = answered + self.misses;
        if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by concurrent cache operations.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    negative_hits: AtomicU64,
    misses: AtomicU64,
    swept: AtomicU64,
}

impl StatsRecorder {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_negative_hit(&self) {
        self.negative_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, count: usize) {
        self.swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::default();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_negative_hits() {
        let recorder = StatsRecorder::default();
        recorder.record_hit();
        recorder.record_negative_hit();
        recorder.record_miss();
        recorder.record_miss();

        let stats = recorder.snapshot(3);
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.total_entries, 3);
    }

    #[test]
    fn test_record_swept_accumulates() {
        let recorder = StatsRecorder::default();
        recorder.record_swept(2);
        recorder.record_swept(3);

        assert_eq!(recorder.snapshot(0).swept, 5);
    }
}
