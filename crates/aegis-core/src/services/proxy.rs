//! The streaming reverse-proxy pipeline: route match, auth, rate limit,
//! circuit breaker admission, bulkhead acquire, retrying forward, and
//! response streaming, in that order.

use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use log::{info, warn};
use reqwest::{Client, Method as ReqwestMethod};
use uuid::Uuid;

use crate::middleware::auth::{self, API_KEY_HEADER};
use crate::models::error::GatewayError;
use crate::models::route::RouteTable;
use crate::services::metrics::MetricsRegistry;
use crate::services::rate_limiter::{self, RateLimiter};
use crate::services::retry::RetryPolicy;
use crate::utils::headers::{build_upstream_headers, forward_response_headers};

/// Shared, immutable (after startup) state handed to every request.
pub struct GatewayState {
    pub routes: RouteTable,
    pub rate_limiter: RateLimiter,
    pub api_key: String,
    pub metrics: MetricsRegistry,
    http_client: Client,
}

impl GatewayState {
    pub fn new(routes: RouteTable, rate_limiter: RateLimiter, api_key: String) -> Self {
        let metrics = MetricsRegistry::new(&routes);
        let http_client = Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("failed to build upstream HTTP client");
        Self {
            routes,
            rate_limiter,
            api_key,
            metrics,
            http_client,
        }
    }
}

/// Outcome of the retry loop: either a response received from the upstream
/// (any status, including 5xx) or a terminal transport/timeout failure.
enum ForwardOutcome {
    Response(reqwest::Response),
    Timeout,
    Transport(String),
}

fn parse_method(method: &actix_web::http::Method) -> ReqwestMethod {
    ReqwestMethod::from_bytes(method.as_str().as_bytes()).unwrap_or(ReqwestMethod::GET)
}

/// Catch-all handler registered behind `/gateway/status`. Implements the
/// full proxy pipeline for every other path.
pub async fn handle(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> Result<HttpResponse, GatewayError> {
    let correlation_id = req
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request_path = req.path();

    let (matched_prefix, forward_path, route) = state
        .routes
        .find_match(request_path)
        .ok_or_else(|| GatewayError::RouteNotFound {
            path: request_path.to_string(),
            correlation_id: correlation_id.clone(),
        })?;

    let presented_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_anonymous = route.is_anonymous(&forward_path);
    let is_authenticated = auth::has_valid_key(presented_key, &state.api_key);

    if !is_anonymous && !is_authenticated {
        warn!(
            "[{correlation_id}] unauthorized request to {request_path}, route {matched_prefix}"
        );
        return Err(GatewayError::Unauthorized {
            correlation_id: correlation_id.clone(),
        });
    }

    let client_id = if is_authenticated {
        presented_key.to_string()
    } else {
        req.connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };

    let rate_limit_key = rate_limiter::composite_key(matched_prefix, &client_id);
    state
        .rate_limiter
        .check(
            &rate_limit_key,
            route.config.requests_per_window,
            route.config.window,
        )
        .map_err(|retry_after_secs| GatewayError::RateLimited {
            retry_after_secs,
            correlation_id: correlation_id.clone(),
        })?;

    if !route.breaker.try_admit() {
        warn!("[{correlation_id}] circuit open for route {matched_prefix}");
        return Err(GatewayError::CircuitOpen {
            prefix: matched_prefix.to_string(),
            correlation_id: correlation_id.clone(),
        });
    }

    let _bulkhead_guard = route.bulkhead.try_acquire().ok_or_else(|| {
        GatewayError::BulkheadFull {
            prefix: matched_prefix.to_string(),
            correlation_id: correlation_id.clone(),
        }
    })?;

    let started_at = Instant::now();
    let retry_policy = RetryPolicy::new(route.config.max_retries, route.config.retry_base_delay);
    let method = req.method().clone();
    let attempts = retry_policy.attempts_for(method.as_str());
    let reqwest_method = parse_method(&method);
    let upstream_headers = build_upstream_headers(req.headers(), &correlation_id);
    let target_url = format!(
        "{}{}",
        route.config.upstream_base_url.trim_end_matches('/'),
        forward_path
    );

    let mut outcome = ForwardOutcome::Transport("no attempt made".to_string());

    for attempt in 1..=attempts {
        let attempt_request = state
            .http_client
            .request(reqwest_method.clone(), &target_url)
            .headers(upstream_headers.clone())
            .body(body.to_vec());

        let send = tokio::time::timeout(route.config.timeout, attempt_request.send()).await;

        outcome = match send {
            Ok(Ok(response)) => ForwardOutcome::Response(response),
            Ok(Err(e)) => ForwardOutcome::Transport(e.to_string()),
            Err(_) => ForwardOutcome::Timeout,
        };

        let should_retry = match &outcome {
            ForwardOutcome::Response(resp) => RetryPolicy::should_retry_status(resp.status().as_u16()),
            ForwardOutcome::Timeout | ForwardOutcome::Transport(_) => true,
        };

        if !should_retry || attempt == attempts {
            break;
        }

        if attempt > 1 || matches!(outcome, ForwardOutcome::Timeout | ForwardOutcome::Transport(_)) {
            info!(
                "[{correlation_id}] retrying {matched_prefix} attempt {}/{attempts}",
                attempt + 1
            );
        }
        tokio::time::sleep(retry_policy.backoff(attempt)).await;
    }

    let latency_ms = started_at.elapsed().as_millis() as u64;

    match outcome {
        ForwardOutcome::Response(response) => {
            let status = response.status();
            let is_error = status.as_u16() >= 500;
            if is_error {
                route.breaker.on_failure();
            } else {
                route.breaker.on_success();
            }
            state.metrics.record(matched_prefix, latency_ms, is_error);

            let actix_status = actix_web::http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
            let mut builder = HttpResponse::build(actix_status);
            forward_response_headers(&mut builder, response.headers());
            builder.insert_header(("X-Correlation-Id", correlation_id.clone()));

            let byte_stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
            Ok(builder.streaming(byte_stream))
        }
        ForwardOutcome::Timeout => {
            route.breaker.on_failure();
            state.metrics.record(matched_prefix, latency_ms, true);
            Err(GatewayError::UpstreamTimeout {
                timeout_ms: route.config.timeout.as_millis() as u64,
                correlation_id: correlation_id.clone(),
            })
        }
        ForwardOutcome::Transport(message) => {
            route.breaker.on_failure();
            state.metrics.record(matched_prefix, latency_ms, true);
            Err(GatewayError::UpstreamUnavailable {
                message,
                correlation_id: correlation_id.clone(),
            })
        }
    }
}
