//! Route configuration and the longest-prefix route table.

use std::time::Duration;

use crate::middleware::auth;
use crate::services::bulkhead::Bulkhead;
use crate::services::circuit_breaker::CircuitBreaker;

/// Static, immutable configuration for one route prefix. Built once at
/// startup from environment variables and never mutated afterward.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// The path prefix this route matches, as configured (original case).
    pub prefix: String,
    /// Base URL of the upstream service, e.g. `http://backend:8080`.
    pub upstream_base_url: String,
    /// Per-attempt deadline for the upstream call.
    pub timeout: Duration,
    /// Forward-path prefixes that bypass authentication for this route.
    pub anonymous_prefixes: Vec<String>,
    /// Requests admitted per fixed window, per client.
    pub requests_per_window: u64,
    /// Width of the fixed rate-limit window.
    pub window: Duration,
    /// Bulkhead capacity: maximum concurrent in-flight upstream calls.
    pub max_concurrent_requests: usize,
    /// Additional attempts beyond the first for safe methods.
    pub max_retries: u32,
    /// Base delay for the exponential backoff between retries.
    pub retry_base_delay: Duration,
    /// Consecutive failures before the breaker trips to `Open`.
    pub breaker_failure_threshold: u64,
    /// How long the breaker stays `Open` before allowing a probe.
    pub breaker_cooldown: Duration,
}

/// A configured route bundled with the per-route runtime state the proxy
/// needs on every request: its bulkhead and its circuit breaker.
pub struct RouteEntry {
    pub config: RouteConfig,
    pub bulkhead: Bulkhead,
    pub breaker: CircuitBreaker,
}

impl RouteEntry {
    fn new(config: RouteConfig) -> Self {
        let bulkhead = Bulkhead::new(config.max_concurrent_requests);
        let breaker = CircuitBreaker::new(
            config.prefix.clone(),
            config.breaker_failure_threshold,
            config.breaker_cooldown,
        );
        Self {
            config,
            bulkhead,
            breaker,
        }
    }

    /// True iff `forward_path` begins, case-insensitively, with any of this
    /// route's anonymous-allowlisted prefixes.
    pub fn is_anonymous(&self, forward_path: &str) -> bool {
        auth::is_anonymous(forward_path, &self.config.anonymous_prefixes)
    }
}

/// Immutable, longest-prefix route table. Built once at startup; lookups
/// never allocate shared state and never block.
pub struct RouteTable {
    /// (lowercased prefix, entry), sorted by prefix length descending so the
    /// first match found is always the longest.
    entries: Vec<(String, RouteEntry)>,
}

impl RouteTable {
    pub fn new(configs: Vec<RouteConfig>) -> Self {
        let mut entries: Vec<(String, RouteEntry)> = configs
            .into_iter()
            .map(|c| (c.prefix.to_ascii_lowercase(), RouteEntry::new(c)))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    /// Matches `request_path` against the longest configured prefix. Returns
    /// the matched prefix, the forward path (remainder after stripping the
    /// prefix, `"/"` when empty), and the route entry.
    pub fn find_match(&self, request_path: &str) -> Option<(&str, String, &RouteEntry)> {
        let lower_path = request_path.to_ascii_lowercase();
        for (prefix, entry) in &self.entries {
            if lower_path.starts_with(prefix.as_str()) {
                let remainder = &request_path[prefix.len().min(request_path.len())..];
                let forward_path = if remainder.is_empty() {
                    "/".to_string()
                } else if remainder.starts_with('/') {
                    remainder.to_string()
                } else {
                    format!("/{remainder}")
                };
                return Some((entry.config.prefix.as_str(), forward_path, entry));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().map(|(_, entry)| entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(prefix: &str) -> RouteConfig {
        RouteConfig {
            prefix: prefix.to_string(),
            upstream_base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
            anonymous_prefixes: vec!["/health".to_string()],
            requests_per_window: 100,
            window: Duration::from_secs(60),
            max_concurrent_requests: 10,
            max_retries: 1,
            retry_base_delay: Duration::from_millis(10),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }

    #[test]
    fn longest_prefix_wins_regardless_of_insertion_order() {
        let table = RouteTable::new(vec![test_config("/api"), test_config("/api/v2")]);
        let (prefix, _, _) = table.find_match("/api/v2/users").unwrap();
        assert_eq!(prefix, "/api/v2");

        let table_reordered = RouteTable::new(vec![test_config("/api/v2"), test_config("/api")]);
        let (prefix, _, _) = table_reordered.find_match("/api/v2/users").unwrap();
        assert_eq!(prefix, "/api/v2");
    }

    #[test]
    fn empty_remainder_yields_root_forward_path() {
        let table = RouteTable::new(vec![test_config("/api")]);
        let (_, forward, _) = table.find_match("/api").unwrap();
        assert_eq!(forward, "/");
    }

    #[test]
    fn match_is_case_insensitive() {
        let table = RouteTable::new(vec![test_config("/Api")]);
        assert!(table.find_match("/api/ping").is_some());
        assert!(table.find_match("/API/PING").is_some());
    }

    #[test]
    fn no_match_returns_none() {
        let table = RouteTable::new(vec![test_config("/api")]);
        assert!(table.find_match("/other").is_none());
    }

    #[test]
    fn anonymous_prefix_check_is_case_insensitive() {
        let table = RouteTable::new(vec![test_config("/api")]);
        let (_, _, entry) = table.find_match("/api/health/live").unwrap();
        assert!(entry.is_anonymous("/HEALTH/live"));
        assert!(!entry.is_anonymous("/users"));
    }
}
