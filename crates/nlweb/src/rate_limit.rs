//! Fixed-window rate limiting keyed by caller identifier.
//!
//! One bucket per identifier (remote IP or a configured client header),
//! stored in a bounded LRU map. Evicting an identifier forfeits whatever
//! budget it consumed in its current window; the next `allow` starts a fresh
//! bucket. That loss is accepted in exchange for bounded memory.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::RateLimitConfig;

/// One identifier's budget within the current window.
#[derive(Debug, Clone)]
struct RateBucket {
    requests: u32,
    window_start: Instant,
}

/// Snapshot of an identifier's budget, reported without consuming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether a request made now would be allowed
    pub allowed: bool,
    /// Tokens left in the current window
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_in: Duration,
    /// Window capacity
    pub total: u32,
}

/// Per-identifier fixed-window limiter.
pub struct RateLimiter {
    enabled: bool,
    requests_per_window: u32,
    window: Duration,
    buckets: Mutex<LruCache<String, RateBucket>>,
}

impl RateLimiter {
    /// Build a limiter from its configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_tracked_identifiers.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            enabled: config.enabled,
            requests_per_window: config.requests_per_window,
            window: Duration::from_secs(config.window_secs),
            buckets: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Atomically consume one token for `identifier` if the window has budget.
    ///
    /// Returns true iff a token was consumed. A disabled limiter always
    /// returns true without tracking anything.
    pub fn allow(&self, identifier: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = match buckets.get_mut(identifier) {
            Some(bucket) => bucket,
            None => {
                buckets.put(
                    identifier.to_string(),
                    RateBucket {
                        requests: 0,
                        window_start: now,
                    },
                );
                match buckets.get_mut(identifier) {
                    Some(bucket) => bucket,
                    // Unreachable: the entry was just inserted
                    None => return true,
                }
            }
        };

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.requests = 0;
            bucket.window_start = now;
        }

        if bucket.requests < self.requests_per_window {
            bucket.requests += 1;
            true
        } else {
            tracing::debug!(identifier, "Rate limit exceeded");
            false
        }
    }

    /// Report `identifier`'s budget without consuming a token.
    pub fn status(&self, identifier: &str) -> RateLimitStatus {
        if !self.enabled {
            return RateLimitStatus {
                allowed: true,
                remaining: u32::MAX,
                reset_in: Duration::ZERO,
                total: u32::MAX,
            };
        }
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        // peek would suffice, but get refreshes recency so active callers
        // are not the ones evicted
        let bucket = buckets.get(identifier);

        let (requests, reset_in) = match bucket {
            Some(bucket) => {
                let elapsed = now.duration_since(bucket.window_start);
                if elapsed >= self.window {
                    (0, self.window)
                } else {
                    // saturating: clock skew must not produce a negative reset
                    (bucket.requests, self.window.saturating_sub(elapsed))
                }
            }
            None => (0, self.window),
        };

        let remaining = self.requests_per_window.saturating_sub(requests);
        RateLimitStatus {
            allowed: remaining > 0,
            remaining,
            reset_in,
            total: self.requests_per_window,
        }
    }

    /// Whether the limiter is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
