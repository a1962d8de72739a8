//! Per-route circuit breaker.
//!
//! Three states gate admission to a route's upstream: `Closed` (normal
//! operation), `Open` (failing fast) and `HalfOpen` (exactly one probe
//! request allowed through to test recovery). The state and the admission
//! decision are computed under a single lock so that, when a cooldown
//! expires, only the caller that performs the `Open` → `HalfOpen` transition
//! receives the probe grant — every other concurrent caller is denied.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{info, warn};

/// Observable state of a circuit breaker, as reported in metrics snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u64,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// A per-route circuit breaker.
///
/// `failure_threshold` consecutive failures in `Closed` trip the breaker to
/// `Open`. After `cooldown` has elapsed, the next admission attempt moves it
/// to `HalfOpen` and is itself let through as the probe. A single success in
/// `HalfOpen` closes the breaker; a single failure reopens it.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u64,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u64, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Decides whether a request may proceed past breaker admission.
    ///
    /// This is the only place the `Open` → `HalfOpen` transition happens, and
    /// it happens while holding the lock, so the cooldown-expiry race that
    /// would otherwise let two callers both believe they are "the" probe
    /// cannot occur.
    pub fn try_admit(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!("circuit {} entering half-open, admitting probe", self.name);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful outcome for a request this breaker admitted.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                info!("circuit {} closed after successful probe", self.name);
            }
            CircuitState::Open => {
                // Admission never grants Open, so a feedback call here would
                // indicate a bug in the caller; ignore defensively.
            }
        }
    }

    /// Records a failed outcome for a request this breaker admitted.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        "circuit {} opened after {} consecutive failures",
                        self.name, inner.consecutive_failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = 0;
                inner.probe_in_flight = false;
                warn!("circuit {} reopened after failed probe", self.name);
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("svc", 3, Duration::from_secs(30));
        assert!(breaker.try_admit());
        breaker.on_failure();
        assert!(breaker.try_admit());
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_admit());
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_admit());
    }

    #[test]
    fn success_resets_failure_count_in_closed_state() {
        let breaker = CircuitBreaker::new("svc", 2, Duration::from_secs(30));
        breaker.on_failure();
        breaker.on_success();
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_allows_exactly_one_probe() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(10));
        assert!(breaker.try_admit());
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));

        // First caller past the cooldown gets the probe.
        assert!(breaker.try_admit());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Any concurrent caller is denied while the probe is outstanding.
        assert!(!breaker.try_admit());
        assert!(!breaker.try_admit());
    }

    #[test]
    fn half_open_success_closes_with_single_success() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(10));
        breaker.try_admit();
        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(20));
        breaker.try_admit();
        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_admit());
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(10));
        breaker.try_admit();
        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(20));
        breaker.try_admit();
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
