//! Retry policy: which attempts are permitted, which outcomes are retryable,
//! and how long to back off between attempts.

use rand::Rng;
use std::time::Duration;

/// Methods considered safe to retry: they carry no side effects, so a
/// repeated attempt after a transport failure or timeout cannot double the
/// effect of the original request.
fn is_safe_method(method: &str) -> bool {
    matches!(method.to_ascii_uppercase().as_str(), "GET" | "HEAD" | "OPTIONS")
}

/// Retry policy derived from a route's configured `max_retries`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total number of attempts allowed for this method: `max_retries + 1`
    /// for safe methods, exactly `1` for everything else.
    pub fn attempts_for(&self, method: &str) -> u32 {
        if is_safe_method(method) {
            self.max_retries + 1
        } else {
            1
        }
    }

    /// Whether an outcome should trigger another attempt. A transport error
    /// is always retryable; among status codes, only 5xx is — a 4xx means
    /// the upstream understood and rejected the request, and retrying it
    /// unchanged cannot help.
    pub fn should_retry_status(status: u16) -> bool {
        status >= 500
    }

    /// Delay before the `n`th retry (`n` is 1-based: the delay before the
    /// first retry, after attempt 1 failed). Exponential backoff with full
    /// jitter: `base * 2^(n-1) * (1 + U)`, `U` uniform in `[0, 0.5)`.
    pub fn backoff(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1);
        let factor = 2u32.saturating_pow(exponent.min(20)) as f64;
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
        self.base_delay.mul_f64(factor * (1.0 + jitter))
    }
}
