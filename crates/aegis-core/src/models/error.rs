//! Gateway error taxonomy and its mapping onto HTTP responses.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Errors that can terminate the gateway's request pipeline before (or instead
/// of) a response from an upstream service.
///
/// Every variant maps to exactly one HTTP status, mirroring the external
/// status code contract: 401 for authentication, 404 for an unmatched route,
/// 429 for rate limiting and bulkhead saturation, 503 for an open circuit,
/// 504 for a per-attempt timeout and 502 for an exhausted upstream failure.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No configured route prefix matches the request path.
    #[error("no route matches path: {path}")]
    RouteNotFound { path: String, correlation_id: String },

    /// The request carries no API key, or the key does not match the
    /// configured value, and the matched route does not allow anonymous
    /// access to this path.
    #[error("missing or invalid API key")]
    Unauthorized { correlation_id: String },

    /// The client has exceeded the fixed-window rate limit for its route
    /// and client id. `retry_after_secs` is always present for this variant.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        correlation_id: String,
    },

    /// The route's bulkhead has no free slots. Unlike rate limiting, no
    /// `Retry-After` is given — admission is governed by concurrency, not time.
    #[error("bulkhead at capacity for route {prefix}")]
    BulkheadFull { prefix: String, correlation_id: String },

    /// The route's circuit breaker is open, or half-open with a probe
    /// already in flight.
    #[error("circuit open for route {prefix}")]
    CircuitOpen { prefix: String, correlation_id: String },

    /// The last permitted attempt exceeded its per-attempt deadline.
    #[error("upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout {
        timeout_ms: u64,
        correlation_id: String,
    },

    /// All permitted attempts failed at the transport level (connection
    /// refused, DNS failure, reset, etc.) without producing a response.
    #[error("upstream request failed: {message}")]
    UpstreamUnavailable {
        message: String,
        correlation_id: String,
    },

    /// The route table, environment configuration, or a route definition is
    /// malformed in a way that prevents safe operation.
    #[error("configuration error: {message}")]
    Config { message: String, correlation_id: String },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BulkheadFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        if let GatewayError::RateLimited { retry_after_secs, .. } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
        }
        builder.insert_header(("X-Correlation-Id", self.correlation_id().to_string()));

        builder.json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        })
    }
}

impl GatewayError {
    /// A short machine-readable tag for the error body, stable across
    /// message wording changes.
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::BulkheadFull { .. } => "bulkhead_full",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::Config { .. } => "config_error",
        }
    }

    /// The correlation id of the request that produced this error, echoed on
    /// the error response per the same contract the success path follows.
    fn correlation_id(&self) -> &str {
        match self {
            GatewayError::RouteNotFound { correlation_id, .. }
            | GatewayError::Unauthorized { correlation_id }
            | GatewayError::RateLimited { correlation_id, .. }
            | GatewayError::BulkheadFull { correlation_id, .. }
            | GatewayError::CircuitOpen { correlation_id, .. }
            | GatewayError::UpstreamTimeout { correlation_id, .. }
            | GatewayError::UpstreamUnavailable { correlation_id, .. }
            | GatewayError::Config { correlation_id, .. } => correlation_id,
        }
    }
}
