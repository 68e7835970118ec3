//! Rate Limiter Module
//!
//! Attempt counter with escalation to a punishment period, keyed by an
//! identity string (usually client address plus route). Entries live in a
//! [`TtlCache`] so idle identities are swept away; each entry carries its own
//! lock so attempts by one identity never contend with another.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{Sweep, TtlCache};
use crate::clock::{to_delta, SharedClock};

// == Rate Limit Policy ==
/// Tunables of a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Attempts allowed before the identity is limited
    pub threshold: u32,
    /// Idle time after which the counter starts over
    pub reset_window: Duration,
    /// Time since the last attempt a limited identity must wait
    pub punishment: Duration,
    /// Idle lifetime of an entry before the sweep drops it
    pub entry_ttl: Duration,
}

// == Attempt Entry ==
/// Per-identity attempt record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptEntry {
    pub count: u32,
    pub last_attempt: DateTime<Utc>,
}

impl AttemptEntry {
    fn first(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            last_attempt: now,
        }
    }

    /// Records one attempt at `now` and reports whether it is limited.
    pub fn record(&mut self, now: DateTime<Utc>, policy: &RateLimitPolicy) -> bool {
        let idle = now - self.last_attempt;

        if idle > to_delta(policy.reset_window) {
            *self = Self::first(now);
            return false;
        }

        if self.count > policy.threshold {
            if idle > to_delta(policy.punishment) {
                *self = Self::first(now);
                return false;
            }
            // Still punished; keep extending from the latest attempt
            self.last_attempt = now;
            return true;
        }

        self.count += 1;
        self.last_attempt = now;
        self.count > policy.threshold
    }
}

type SharedAttempt = Arc<Mutex<Option<AttemptEntry>>>;

// == Rate Limiter ==
/// Sliding attempt counter keyed by identity.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    clock: SharedClock,
    entries: TtlCache<String, SharedAttempt>,
}

impl RateLimiter {
    // == Constructor ==
    pub fn new(name: &'static str, policy: RateLimitPolicy, clock: SharedClock) -> Self {
        let entries = TtlCache::new(name, clock.clone(), policy.entry_ttl, policy.entry_ttl);
        Self {
            name,
            policy,
            clock,
            entries,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    // == Is Limited ==
    /// Records an attempt by `identity` and reports whether it must be refused.
    pub fn is_limited(&self, identity: &str) -> bool {
        let slot = self
            .entries
            .get_or_add_with(identity.to_string(), || Arc::new(Mutex::new(None)));

        let mut guard = slot.lock();
        let now = self.clock.now();
        let limited = match guard.as_mut() {
            None => {
                *guard = Some(AttemptEntry::first(now));
                false
            }
            Some(entry) => entry.record(now, &self.policy),
        };

        if limited {
            warn!(limiter = self.name, identity, "rate limit exceeded");
        } else {
            debug!(limiter = self.name, identity, "attempt allowed");
        }
        limited
    }

    // == Peek ==
    /// Returns the current record for `identity` without counting an attempt.
    pub fn peek(&self, identity: &str) -> Option<AttemptEntry> {
        let slot = self.entries.get(&identity.to_string()).found()?;
        let guard = slot.lock();
        guard.clone()
    }

    // == Forget ==
    /// Drops the record for `identity`, e.g. after a successful login.
    pub fn forget(&self, identity: &str) -> bool {
        self.entries.delete(&identity.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Sweep for RateLimiter {
    fn label(&self) -> &'static str {
        self.name
    }

    fn sweep_expired(&self) -> usize {
        self.entries.cleanup_expired()
    }
}

// == Identity Keys ==
/// Builds the limiter key for a client hitting a route.
pub fn identity_key(client: &str, route: &str) -> String {
    format!("{client}:{route}")
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn policy(threshold: u32, window: u64, punishment: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            threshold,
            reset_window: Duration::from_secs(window),
            punishment: Duration::from_secs(punishment),
            entry_ttl: Duration::from_secs(3600),
        }
    }

    fn limiter(p: RateLimitPolicy) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (RateLimiter::new("test", p, clock.clone()), clock)
    }

    #[test]
    fn test_fourth_attempt_denied() {
        let (limiter, clock) = limiter(policy(3, 60, 30));

        for _ in 0..3 {
            assert!(!limiter.is_limited("10.0.0.1:login"));
            clock.advance(Duration::from_secs(1));
        }
        assert!(limiter.is_limited("10.0.0.1:login"));
    }

    #[test]
    fn test_punishment_elapses_and_counter_resets() {
        let (limiter, clock) = limiter(policy(3, 600, 30));
        for _ in 0..4 {
            limiter.is_limited("id");
        }
        assert!(limiter.is_limited("id"));

        clock.advance(Duration::from_secs(31));
        assert!(!limiter.is_limited("id"));
        assert_eq!(limiter.peek("id").unwrap().count, 1);
    }

    #[test]
    fn test_limited_attempt_extends_punishment() {
        let (limiter, clock) = limiter(policy(1, 600, 30));
        limiter.is_limited("id");
        assert!(limiter.is_limited("id"));

        clock.advance(Duration::from_secs(20));
        assert!(limiter.is_limited("id"));
        let count = limiter.peek("id").unwrap().count;

        // 20s since the previous attempt, 40s since tripping
        clock.advance(Duration::from_secs(20));
        assert!(limiter.is_limited("id"));
        assert_eq!(limiter.peek("id").unwrap().count, count);
    }

    #[test]
    fn test_reset_window_restarts_count() {
        let (limiter, clock) = limiter(policy(3, 60, 600));
        limiter.is_limited("id");
        limiter.is_limited("id");

        clock.advance(Duration::from_secs(61));
        assert!(!limiter.is_limited("id"));
        assert_eq!(limiter.peek("id").unwrap().count, 1);
    }

    #[test]
    fn test_identities_are_independent() {
        let (limiter, _) = limiter(policy(1, 60, 60));
        limiter.is_limited("a");
        assert!(limiter.is_limited("a"));

        assert!(!limiter.is_limited("b"));
    }

    #[test]
    fn test_idle_entries_are_swept() {
        let (limiter, clock) = limiter(policy(3, 60, 60));
        limiter.is_limited("a");
        limiter.is_limited("b");

        clock.advance(Duration::from_secs(3601));
        assert_eq!(limiter.sweep_expired(), 2);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_forget() {
        let (limiter, _) = limiter(policy(1, 60, 60));
        limiter.is_limited("a");
        assert!(limiter.is_limited("a"));

        assert!(limiter.forget("a"));
        assert!(!limiter.is_limited("a"));
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key("127.0.0.1", "/login"), "127.0.0.1:/login");
    }

    #[test]
    fn test_concurrent_attempts_counted_exactly() {
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        let limiter = Arc::new(RateLimiter::new("concurrent", policy(50, 600, 600), clock));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.is_limited("shared")).count()
                })
            })
            .collect();
        let limited: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(limited, 50);
        assert_eq!(limiter.peek("shared").unwrap().count, 51);
    }
}
