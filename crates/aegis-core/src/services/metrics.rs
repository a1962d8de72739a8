//! Per-route request counters and the gateway status snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::models::route::RouteTable;

/// Lock-free per-route counters. Latency is tracked as a running sum plus a
/// count so the average can be derived without storing a history.
#[derive(Default)]
struct RouteCounters {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl RouteCounters {
    fn record(&self, latency_ms: u64, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency_ms(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_sum_ms.load(Ordering::Relaxed) as f64 / count as f64
    }
}

/// Registry of per-route counters, keyed by the route's configured prefix.
/// Built once at startup from the route table, so no lock is needed to find
/// an entry — only the counters themselves are mutated concurrently, and
/// those mutations are atomic.
pub struct MetricsRegistry {
    started_at: Instant,
    counters: Mutex<HashMap<String, RouteCounters>>,
}

impl MetricsRegistry {
    pub fn new(routes: &RouteTable) -> Self {
        let mut counters = HashMap::new();
        for entry in routes.iter() {
            counters.insert(entry.config.prefix.clone(), RouteCounters::default());
        }
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(counters),
        }
    }

    /// Records the outcome of one completed request against `route_prefix`.
    /// Admission rejections (auth, rate limit, bulkhead full, breaker open)
    /// never reach this call — the stopwatch for `latency_ms` starts at
    /// bulkhead acquire, per the route's recorded measurement point.
    pub fn record(&self, route_prefix: &str, latency_ms: u64, is_error: bool) {
        let counters = self.counters.lock().expect("metrics registry mutex poisoned");
        if let Some(c) = counters.get(route_prefix) {
            c.record(latency_ms, is_error);
        }
    }

    pub fn snapshot(&self, routes: &RouteTable) -> StatusSnapshot {
        let counters = self.counters.lock().expect("metrics registry mutex poisoned");
        let routes = routes
            .iter()
            .map(|entry| {
                let prefix = entry.config.prefix.clone();
                let stats = counters.get(&prefix);
                RouteSnapshot {
                    prefix,
                    circuit_state: format!("{:?}", entry.breaker.state()),
                    bulkhead_available: entry.bulkhead.available(),
                    bulkhead_max: entry.bulkhead.max(),
                    total_requests: stats.map(|s| s.total_requests.load(Ordering::Relaxed)).unwrap_or(0),
                    total_errors: stats.map(|s| s.total_errors.load(Ordering::Relaxed)).unwrap_or(0),
                    avg_latency_ms: stats.map(|s| s.avg_latency_ms()).unwrap_or(0.0),
                }
            })
            .collect();

        StatusSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            routes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub prefix: String,
    pub circuit_state: String,
    pub bulkhead_available: usize,
    pub bulkhead_max: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub uptime_secs: u64,
    pub routes: Vec<RouteSnapshot>,
}
