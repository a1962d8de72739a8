//! Fixed-window rate limiter keyed by route prefix and client id.
//!
//! Each key gets its own window: the first request for a key starts a window;
//! once `window` has elapsed since that start, the next request rolls the
//! window over and resets the count rather than waiting for a background
//! sweep. A single lock guards install, rollover and increment together so
//! concurrent requests for the same key never observe a torn count.
//!
//! The limit and window width are supplied per call rather than fixed at
//! construction, since a single shared counter map serves every route and
//! each route configures its own `RequestsPerWindow`/`WindowMs`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ahash::RandomState;

struct Window {
    started_at: Instant,
    count: u64,
}

/// Builds the composite rate-limit key: route prefix and client id, joined
/// so that limits never leak across routes or between two clients that
/// happen to share an id on different routes.
pub fn composite_key(route_prefix: &str, client_id: &str) -> String {
    format!("{route_prefix}:{client_id}")
}

pub struct RateLimiter {
    counters: Mutex<HashMap<String, Window, RandomState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Checks and, if admitted, consumes one unit of `key`'s budget against
    /// `limit` requests per `window`. Returns `Err(retry_after_secs)` when
    /// the key's window is exhausted, rounded up to the next whole second.
    pub fn check(&self, key: &str, limit: u64, window: Duration) -> Result<(), u64> {
        let now = Instant::now();
        let mut counters = self.counters.lock().expect("rate limiter mutex poisoned");
        let entry = counters.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count < limit {
            entry.count += 1;
            Ok(())
        } else {
            let elapsed = now.duration_since(entry.started_at);
            let remaining = window.saturating_sub(elapsed);
            let secs = remaining.as_secs_f64().ceil() as u64;
            Err(secs.max(1))
        }
    }

    /// Drops counters whose window started longer than `stale_after` ago, so
    /// the key map does not grow without bound as distinct client ids come
    /// and go.
    pub fn sweep(&self, stale_after: Duration) {
        let now = Instant::now();
        let mut counters = self.counters.lock().expect("rate limiter mutex poisoned");
        counters.retain(|_, w| now.duration_since(w.started_at) < stale_after);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.counters.lock().unwrap().len()
    }
}
