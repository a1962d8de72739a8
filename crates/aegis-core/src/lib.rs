//! Core of the Aegis reverse-proxy API gateway.
//!
//! This crate implements the per-request admission pipeline and the four
//! coupled resilience mechanisms that gate it: longest-prefix routing,
//! fixed-window rate limiting, concurrency bulkheads, and a per-route
//! circuit breaker, plus the retrying streaming proxy that ties them
//! together. Process bootstrap, environment-based configuration loading and
//! log sink formatting live in the `aegis-gateway` binary crate; this crate
//! only needs a fully-populated [`models::route::RouteTable`] to run.

pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
