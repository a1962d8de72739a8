//! Per-route concurrency bulkhead.
//!
//! A bulkhead bounds how many requests may be in flight against a route at
//! once. Unlike rate limiting it has no time dimension: it is a counting
//! semaphore with no queue. A request that cannot acquire a slot is rejected
//! immediately rather than waiting for one to free up.

use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};

/// Non-blocking counting semaphore guarding a route's in-flight request count.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// Holds a single bulkhead slot. Releases it automatically on drop, so the
/// slot is freed on every exit path from the proxy handler — early return,
/// `?`, or task cancellation alike.
#[derive(Debug)]
pub struct BulkheadGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Attempts to acquire a slot without waiting. Returns `None` when the
    /// bulkhead is already at capacity.
    pub fn try_acquire(&self) -> Option<BulkheadGuard> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(BulkheadGuard { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured maximum concurrency.
    pub fn max(&self) -> usize {
        self.max
    }
}
