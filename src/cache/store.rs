//! TTL Cache Module
//!
//! Generic expiring key/value store. Entries live in a sharded concurrent map
//! so operations on different keys do not block each other, while operations
//! on the same key are serialized by the shard lock. Expiry is enforced both
//! lazily on read and actively by the sweep task.

use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::entry::{CacheEntry, Lookup, Slot};
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::clock::{to_delta, SharedClock};

// == TTL Cache ==
/// Expiring cache with negative-caching support.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    /// Label used in logs and stats
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    clock: SharedClock,
    ttl: TimeDelta,
    negative_ttl: TimeDelta,
    stats: StatsRecorder,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a cache whose real values live for `ttl` and negative
    /// markers for `negative_ttl`.
    pub fn new(name: &'static str, clock: SharedClock, ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            clock,
            ttl: to_delta(ttl),
            negative_ttl: to_delta(negative_ttl),
            stats: StatsRecorder::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // == Get ==
    /// Reads a key.
    ///
    /// Expired entries read as `Absent` and are dropped on the way out unless
    /// a concurrent writer refreshed them in the meantime.
    pub fn get(&self, key: &K) -> Lookup<V> {
        let now = self.clock.now();
        let lookup = match self.entries.get(key) {
            Some(entry) => entry.lookup_at(now),
            None => Lookup::Absent,
        };

        match &lookup {
            Lookup::Found(_) => self.stats.record_hit(),
            Lookup::NegativeCached => self.stats.record_negative_hit(),
            Lookup::Absent => {
                self.stats.record_miss();
                self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
            }
        }
        lookup
    }

    // == Add ==
    /// Stores a real value, resetting expiry to now + ttl.
    pub fn add(&self, key: K, value: V) {
        let entry = CacheEntry::new(Slot::Value(value), self.clock.now(), self.ttl);
        self.entries.insert(key, entry);
    }

    // == Add Negative ==
    /// Records that `key` is confirmed absent for one negative TTL.
    pub fn add_negative(&self, key: K) {
        let entry = CacheEntry::new(Slot::Negative, self.clock.now(), self.negative_ttl);
        self.entries.insert(key, entry);
    }

    /// Stores a real value that expires at a fixed instant instead of after
    /// the cache's ttl. Returns false, storing nothing, when that instant has
    /// already passed or a live entry occupies the key.
    pub fn add_until(&self, key: K, value: V, expires_at: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        if expires_at <= now {
            return false;
        }
        let entry = CacheEntry::new(Slot::Value(value), now, expires_at - now);
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired_at(now) {
                    return false;
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        true
    }

    /// Records a negative marker unless a live entry is already present,
    /// so a concurrent positive insert is never masked.
    pub fn add_negative_if_absent(&self, key: K) {
        let now = self.clock.now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired_at(now) {
                    occupied.insert(CacheEntry::new(Slot::Negative, now, self.negative_ttl));
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(Slot::Negative, now, self.negative_ttl));
            }
        }
    }

    // == Replace With ==
    /// Computes a new value from the live one (if any) and stores it with a
    /// fresh expiry, all under the key's lock.
    pub fn replace_with<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let now = self.clock.now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let live = match (&current.slot, current.is_expired_at(now)) {
                    (Slot::Value(value), false) => Some(value),
                    _ => None,
                };
                let value = make(live);
                occupied.insert(CacheEntry::new(Slot::Value(value.clone()), now, self.ttl));
                value
            }
            Entry::Vacant(vacant) => {
                let value = make(None);
                vacant.insert(CacheEntry::new(Slot::Value(value.clone()), now, self.ttl));
                value
            }
        }
    }

    // == Delete ==
    /// Removes an entry; returns whether anything was removed.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes an entry only while `pred` holds for its live value.
    ///
    /// The check and the removal happen under the same key lock.
    pub fn delete_if<F>(&self, key: &K, pred: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        let now = self.clock.now();
        let removed = self.entries.remove_if(key, |_, entry| {
            if entry.is_expired_at(now) {
                return false;
            }
            match &entry.slot {
                Slot::Value(value) => pred(value),
                Slot::Negative => false,
            }
        });
        match removed {
            Some((_, CacheEntry { slot: Slot::Value(value), .. })) => Some(value),
            _ => None,
        }
    }

    // == Get Or Add ==
    /// Returns the live value under `key`, inserting `make()` when nothing
    /// live is present. Either way the entry's expiry moves to now + ttl.
    pub fn get_or_add_with<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_expired_at(now) {
                    if let Slot::Value(value) = &entry.slot {
                        let value = value.clone();
                        entry.refresh(now, self.ttl);
                        return value;
                    }
                }
                let value = make();
                occupied.insert(CacheEntry::new(Slot::Value(value.clone()), now, self.ttl));
                value
            }
            Entry::Vacant(vacant) => {
                let value = make();
                vacant.insert(CacheEntry::new(Slot::Value(value.clone()), now, self.ttl));
                value
            }
        }
    }

    // == Update In Place ==
    /// Applies `update` to a live real value without touching its expiry.
    ///
    /// Returns the updated value, or `None` when nothing live is cached.
    pub fn update_in_place<F>(&self, key: &K, update: F) -> Option<V>
    where
        F: FnOnce(&mut V),
    {
        let now = self.clock.now();
        let mut entry = self.entries.get_mut(key)?;
        if entry.is_expired_at(now) {
            return None;
        }
        match &mut entry.slot {
            Slot::Value(value) => {
                update(value);
                Some(value.clone())
            }
            Slot::Negative => None,
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entries.len())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before.saturating_sub(self.entries.len());
        self.stats.record_swept(removed);
        removed
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
