//! Header filtering for the outbound (gateway → upstream) leg of a request.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Headers whose scope is a single connection and must never be forwarded by
/// a proxy, plus the gateway's own credential and correlation headers, which
/// are re-derived rather than passed through verbatim.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Builds the header set sent to the upstream: copies everything from the
/// inbound request except hop-by-hop headers, the credential header, and any
/// incoming correlation id, then injects the resolved correlation id.
pub fn build_upstream_headers(
    inbound: &actix_web::http::header::HeaderMap,
    correlation_id: &str,
) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len() + 1);

    for (name, value) in inbound {
        let lower = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP.contains(&lower.as_str()) {
            continue;
        }
        if lower == crate::middleware::auth::API_KEY_HEADER {
            continue;
        }
        if lower == "x-correlation-id" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_ref()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.insert(name, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        out.insert(HeaderName::from_static("x-correlation-id"), value);
    }

    out
}

/// Copies upstream response headers to the client response, dropping
/// hop-by-hop headers. The correlation id is set separately by the caller
/// since it is owned by the gateway, not the upstream.
pub fn forward_response_headers(
    builder: &mut actix_web::HttpResponseBuilder,
    upstream_headers: &HeaderMap,
) {
    for (name, value) in upstream_headers {
        let lower = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP.contains(&lower.as_str()) {
            continue;
        }
        if let Ok(value) = actix_web::http::header::HeaderValue::from_bytes(value.as_bytes()) {
            builder.insert_header((name.as_str(), value));
        }
    }
}
