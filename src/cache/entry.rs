//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support and
//! the tagged slot that distinguishes real values from negative markers.

use chrono::{DateTime, TimeDelta, Utc};

// == Slot ==
/// What a cache entry holds.
///
/// `Negative` records that the authoritative store confirmed the key absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<V> {
    Value(V),
    Negative,
}

// == Lookup ==
/// Result of reading a key from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// A live real value
    Found(V),
    /// A live negative marker: the key is known to be absent
    NegativeCached,
    /// Nothing live under this key; the caller must resolve it
    Absent,
}

impl<V> Lookup<V> {
    /// Returns the value if this is a positive hit.
    pub fn found(self) -> Option<V> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored slot
    pub slot: Slot<V>,
    /// Insertion time
    pub inserted_at: DateTime<Utc>,
    /// Expiry time; the entry is visible only while `now < expires_at`
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry inserted at `now` living for `ttl`.
    pub fn new(slot: Slot<V>, now: DateTime<Utc>, ttl: TimeDelta) -> Self {
        Self {
            slot,
            inserted_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime at `now`, zero once expired.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        if self.expires_at > now {
            self.expires_at - now
        } else {
            TimeDelta::zero()
        }
    }

    /// Pushes the expiry to `now + ttl`.
    pub fn refresh(&mut self, now: DateTime<Utc>, ttl: TimeDelta) {
        self.expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn is_negative(&self) -> bool {
        matches!(self.slot, Slot::Negative)
    }
}

impl<V: Clone> CacheEntry<V> {
    /// Reads the entry as seen at `now`.
    pub fn lookup_at(&self, now: DateTime<Utc>) -> Lookup<V> {
        if self.is_expired_at(now) {
            return Lookup::Absent;
        }
        match &self.slot {
            Slot::Value(value) => Lookup::Found(value.clone()),
            Slot::Negative => Lookup::NegativeCached,
        }
    }
}
