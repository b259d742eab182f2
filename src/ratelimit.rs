//! Fixed-window per-user rate limiting.
//!
//! Each (user, wall-clock minute) pair maps to a counter entry that is
//! atomically incremented on admission and expires on its own. The counting
//! backend is a trait so the in-memory implementation can be swapped for a
//! shared store without touching admission logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Atomic counter backend for rate-limit windows.
pub trait RateCounter: Send + Sync {
    /// Increment the counter at `key`, setting or refreshing its expiry to
    /// `ttl` from now, and return the post-increment count.
    fn increment_and_expire(&self, key: &str, ttl: Duration) -> anyhow::Result<u64>;
}

/// In-process counter store. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCounter {
    entries: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateCounter for MemoryCounter {
    fn increment_and_expire(&self, key: &str, ttl: Duration) -> anyhow::Result<u64> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("counter mutex poisoned"))?;

        let now = Instant::now();
        entries.retain(|_, (_, deadline)| *deadline > now);

        let entry = entries.entry(key.to_string()).or_insert((0, now + ttl));
        entry.0 += 1;
        entry.1 = now + ttl;
        Ok(entry.0)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub remaining: u64,
}

/// Fixed one-minute-window limiter over a [`RateCounter`].
#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn RateCounter>,
    quota: u64,
    ttl: Duration,
}

impl RateLimiter {
    pub fn new(counter: Arc<dyn RateCounter>, quota: u64, ttl: Duration) -> Self {
        Self {
            counter,
            quota,
            ttl,
        }
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Admit or reject a request for `user_id` in the current minute window.
    ///
    /// Counter backend failures admit the request with full quota reported:
    /// a degraded limiter must not take generation down with it.
    pub fn admit(&self, user_id: &str) -> Admission {
        self.admit_at(user_id, current_epoch_secs())
    }

    fn admit_at(&self, user_id: &str, epoch_secs: u64) -> Admission {
        let window = epoch_secs / 60;
        let key = format!("rl:{user_id}:{window}");

        match self.counter.increment_and_expire(&key, self.ttl) {
            Ok(count) => Admission {
                allowed: count <= self.quota,
                remaining: self.quota.saturating_sub(count),
            },
            Err(err) => {
                tracing::warn!(error = %err, user_id, "Rate counter unavailable, failing open");
                Admission {
                    allowed: true,
                    remaining: self.quota,
                }
            }
        }
    }
}

fn current_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenCounter;

    impl RateCounter for BrokenCounter {
        fn increment_and_expire(&self, _key: &str, _ttl: Duration) -> anyhow::Result<u64> {
            anyhow::bail!("backend down")
        }
    }

    fn limiter(quota: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryCounter::new()),
            quota,
            Duration::from_secs(90),
        )
    }

    #[test]
    fn test_admits_up_to_quota_then_rejects() {
        let rl = limiter(3);
        assert_eq!(rl.admit_at("u1", 0), Admission { allowed: true, remaining: 2 });
        assert_eq!(rl.admit_at("u1", 10), Admission { allowed: true, remaining: 1 });
        assert_eq!(rl.admit_at("u1", 59), Admission { allowed: true, remaining: 0 });
        assert_eq!(rl.admit_at("u1", 59), Admission { allowed: false, remaining: 0 });
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let rl = limiter(1);
        rl.admit_at("u1", 0);
        rl.admit_at("u1", 0);
        let third = rl.admit_at("u1", 0);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn test_new_minute_resets_window() {
        let rl = limiter(1);
        assert!(rl.admit_at("u1", 59).allowed);
        assert!(!rl.admit_at("u1", 59).allowed);
        // Second 60 falls into the next window.
        assert!(rl.admit_at("u1", 60).allowed);
    }

    #[test]
    fn test_users_are_independent() {
        let rl = limiter(1);
        assert!(rl.admit_at("u1", 0).allowed);
        assert!(rl.admit_at("u2", 0).allowed);
        assert!(!rl.admit_at("u1", 0).allowed);
    }

    #[test]
    fn test_fails_open_on_counter_error() {
        let rl = RateLimiter::new(Arc::new(BrokenCounter), 5, Duration::from_secs(90));
        let admission = rl.admit("u1");
        assert!(admission.allowed);
        assert_eq!(admission.remaining, 5);
    }

    #[test]
    fn test_each_increment_refreshes_expiry() {
        let counter = MemoryCounter::new();
        let ttl = Duration::from_millis(100);
        counter.increment_and_expire("k", ttl).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(counter.increment_and_expire("k", ttl).unwrap(), 2);
        std::thread::sleep(Duration::from_millis(60));
        // 120ms after the first increment the entry is still alive because
        // the second increment pushed the deadline out.
        assert_eq!(counter.increment_and_expire("k", ttl).unwrap(), 3);
    }

    #[test]
    fn test_memory_counter_expires_entries() {
        let counter = MemoryCounter::new();
        assert_eq!(
            counter
                .increment_and_expire("k", Duration::from_nanos(1))
                .unwrap(),
            1
        );
        std::thread::sleep(Duration::from_millis(5));
        // Entry lapsed, count restarts.
        assert_eq!(
            counter
                .increment_and_expire("k", Duration::from_secs(60))
                .unwrap(),
            1
        );
    }
}
