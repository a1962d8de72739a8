//! Environment-driven configuration loader.
//!
//! Reads the global API key and route list from `API_KEY` and
//! `GATEWAY_ROUTES`, then per-route settings from
//! `AEGIS_ROUTE_<SANITIZED_PREFIX>_*` variables. A missing required value
//! for a declared route is a fatal startup error.

use std::env;
use std::time::Duration;

use aegis_core::models::route::RouteConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
    #[error("GATEWAY_ROUTES is not set or empty")]
    NoRoutes,
}

/// Converts a path prefix into the uppercase, underscore-delimited token
/// used in its environment variable namespace: `/api/a` -> `API_A`.
fn sanitize_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn required(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var.to_string()))
}

fn required_u64(var: &str) -> Result<u64, ConfigError> {
    let raw = required(var)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw,
    })
}

fn required_usize(var: &str) -> Result<usize, ConfigError> {
    let raw = required(var)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw,
    })
}

fn required_u32(var: &str) -> Result<u32, ConfigError> {
    let raw = required(var)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw,
    })
}

fn load_route(prefix: &str) -> Result<RouteConfig, ConfigError> {
    let sanitized = sanitize_prefix(prefix);
    let ns = |suffix: &str| format!("AEGIS_ROUTE_{sanitized}_{suffix}");

    let mut anonymous_prefixes = vec!["/health".to_string()];
    if let Ok(extra) = env::var(ns("ANON_PREFIXES")) {
        anonymous_prefixes.extend(
            extra
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }

    Ok(RouteConfig {
        prefix: prefix.to_string(),
        upstream_base_url: required(&ns("UPSTREAM_BASE_URL"))?,
        timeout: Duration::from_millis(required_u64(&ns("TIMEOUT_MS"))?),
        anonymous_prefixes,
        requests_per_window: required_u64(&ns("REQUESTS_PER_WINDOW"))?,
        window: Duration::from_millis(required_u64(&ns("WINDOW_MS"))?),
        max_concurrent_requests: required_usize(&ns("MAX_CONCURRENT_REQUESTS"))?,
        max_retries: required_u32(&ns("MAX_RETRIES"))?,
        retry_base_delay: Duration::from_millis(required_u64(&ns("RETRY_DELAY_MS"))?),
        breaker_failure_threshold: required_u64(&ns("CIRCUIT_BREAKER_THRESHOLD"))?,
        breaker_cooldown: Duration::from_millis(required_u64(&ns("CIRCUIT_BREAKER_COOLDOWN_MS"))?),
    })
}

pub struct GatewayConfig {
    pub api_key: String,
    pub routes: Vec<RouteConfig>,
}

pub fn load() -> Result<GatewayConfig, ConfigError> {
    let api_key = required("API_KEY")?;

    let raw_routes = env::var("GATEWAY_ROUTES").map_err(|_| ConfigError::NoRoutes)?;
    let prefixes: Vec<&str> = raw_routes
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if prefixes.is_empty() {
        return Err(ConfigError::NoRoutes);
    }

    let routes = prefixes
        .into_iter()
        .map(load_route)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GatewayConfig { api_key, routes })
}
