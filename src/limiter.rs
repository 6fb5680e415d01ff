//! Sliding-window rate limiting
//!
//! Per-client admission control: each key keeps the timestamps of its
//! admitted requests inside the trailing window, and a new request is
//! admitted only while the retained count is below the configured rate.
//! Entries are pruned lazily on every check for that key — there is no
//! background sweep.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

/// Sliding-window-log rate limiter, keyed by an opaque client identifier
/// (typically the originating IP address).
pub struct RateLimiter {
    /// Maximum admissions per key per window
    rate: usize,
    /// Trailing window length
    window: Duration,
    /// Admission timestamps per key; all mutation happens under this lock
    admissions: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter admitting up to `rate` requests per `window` per key.
    pub fn new(rate: usize, window: Duration) -> Self {
        RateLimiter {
            rate,
            window,
            admissions: Mutex::new(HashMap::new()),
        }
    }

    /// Decide admission for `key`.
    ///
    /// Expired timestamps for the key are pruned on every call, including
    /// calls that end up rejected, so state stays bounded under sustained
    /// rejection. A rate of zero or a zero-length window rejects everything.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut admissions = self
            .admissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let times = admissions.entry(key.to_string()).or_default();
        times.retain(|t| now.duration_since(*t) < self.window);

        if self.rate == 0 || self.window.is_zero() || times.len() >= self.rate {
            trace!(key, retained = times.len(), "admission rejected");
            return false;
        }

        times.push(now);
        trace!(key, retained = times.len(), "admission granted");
        true
    }

    #[cfg(test)]
    fn retained(&self, key: &str) -> usize {
        self.admissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .map_or(0, |times| times.len())
    }
}
