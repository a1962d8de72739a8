//! End-to-end tests for the gateway pipeline: a real upstream bound to a
//! loopback port plays the backend, driven through the in-memory Actix test
//! harness on the client-facing side.

use std::time::Duration;

use actix_web::{test, web, App, HttpResponse};
use aegis_core::models::route::{RouteConfig, RouteTable};
use aegis_core::routes::status;
use aegis_core::services::proxy::{self, GatewayState};
use aegis_core::services::rate_limiter::RateLimiter;

const API_KEY: &str = "test-api-key";

fn echo_ok() -> HttpResponse {
    HttpResponse::Ok().body("upstream ok")
}

fn echo_server_error() -> HttpResponse {
    HttpResponse::InternalServerError().body("upstream broken")
}

async fn spawn_upstream(handler: impl Fn() -> HttpResponse + Clone + Send + 'static) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = actix_web::HttpServer::new(move || {
        let handler = handler.clone();
        App::new().default_service(web::route().to(move || {
            let handler = handler.clone();
            async move { handler() }
        }))
    })
    .listen(listener)
    .unwrap()
    .run();
    tokio::spawn(server);
    format!("http://{addr}")
}

fn route_config(prefix: &str, upstream: &str) -> RouteConfig {
    RouteConfig {
        prefix: prefix.to_string(),
        upstream_base_url: upstream.to_string(),
        timeout: Duration::from_secs(2),
        anonymous_prefixes: vec!["/health".to_string()],
        requests_per_window: 100,
        window: Duration::from_secs(60),
        max_concurrent_requests: 10,
        max_retries: 1,
        retry_base_delay: Duration::from_millis(5),
        breaker_failure_threshold: 5,
        breaker_cooldown: Duration::from_millis(100),
    }
}

fn build_state(routes: Vec<RouteConfig>) -> web::Data<GatewayState> {
    web::Data::new(GatewayState::new(
        RouteTable::new(routes),
        RateLimiter::new(),
        API_KEY.to_string(),
    ))
}

#[actix_web::test]
async fn authenticated_request_is_forwarded_and_returns_upstream_body() {
    let upstream = spawn_upstream(echo_ok).await;
    let state = build_state(vec![route_config("/api", &upstream)]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(status::configure)
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(body, "upstream ok");
}

#[actix_web::test]
async fn missing_key_on_non_anonymous_route_is_rejected() {
    let upstream = spawn_upstream(echo_ok).await;
    let state = build_state(vec![route_config("/api", &upstream)]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-correlation-id", "inbound-cid-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(
        resp.headers().get("x-correlation-id").unwrap().to_str().unwrap(),
        "inbound-cid-123"
    );
}

#[actix_web::test]
async fn anonymous_prefix_bypasses_authentication() {
    let upstream = spawn_upstream(echo_ok).await;
    let state = build_state(vec![route_config("/api", &upstream)]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/health/live").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn unmatched_path_returns_404() {
    let state = build_state(vec![route_config("/api", "http://127.0.0.1:1")]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/other/path")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(!resp
        .headers()
        .get("x-correlation-id")
        .unwrap()
        .to_str()
        .unwrap()
        .is_empty());
}

#[actix_web::test]
async fn rate_limit_exhaustion_returns_429_with_retry_after() {
    let upstream = spawn_upstream(echo_ok).await;
    let mut cfg = route_config("/api", &upstream);
    cfg.requests_per_window = 1;
    cfg.window = Duration::from_secs(60);
    let state = build_state(vec![cfg]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let first = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    assert_eq!(test::call_service(&app, first).await.status(), 200);

    let second = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, second).await;
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().get("Retry-After").is_some());
}

#[actix_web::test]
async fn bulkhead_saturation_returns_429_without_retry_after() {
    let upstream = spawn_upstream(echo_ok).await;
    let mut cfg = route_config("/api", &upstream);
    cfg.max_concurrent_requests = 1;
    cfg.requests_per_window = 1000;
    let state = build_state(vec![cfg]);

    let route = state.routes.find_match("/api/ping").unwrap().2;
    let held_guard = route.bulkhead.try_acquire().unwrap();

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().get("Retry-After").is_none());

    drop(held_guard);
}

#[actix_web::test]
async fn repeated_5xx_trips_the_breaker_to_open() {
    let upstream = spawn_upstream(echo_server_error).await;
    let mut cfg = route_config("/api", &upstream);
    cfg.breaker_failure_threshold = 2;
    cfg.max_retries = 0;
    let state = build_state(vec![cfg]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(status::configure)
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/api/ping")
            .insert_header(("x-api-key", API_KEY))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
    }

    let req = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
}

#[actix_web::test]
async fn status_endpoint_reports_route_health() {
    let upstream = spawn_upstream(echo_ok).await;
    let state = build_state(vec![route_config("/api", &upstream)]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(status::configure)
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/ping")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    test::call_service(&app, req).await;

    let status_req = test::TestRequest::get().uri("/gateway/status").to_request();
    let resp = test::call_service(&app, status_req).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["routes"][0]["totalRequests"], 1);
}

#[actix_web::test]
async fn unsafe_method_gets_a_single_attempt_against_a_failing_upstream() {
    let cfg = route_config("/api", "http://127.0.0.1:1");
    let state = build_state(vec![cfg]);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(proxy::handle)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/submit")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
}
