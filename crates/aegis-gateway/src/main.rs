//! Aegis API Gateway Server
//!
//! Reverse-proxy API gateway with per-route rate limiting, bulkheads and
//! circuit breaking. This binary owns environment-based configuration and
//! the HTTP server bootstrap; the proxy pipeline itself lives in
//! `aegis-core`.

mod config;

use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use aegis_core::logs::logger::configure_logger;
use aegis_core::models::route::RouteTable;
use aegis_core::routes::status;
use aegis_core::services::proxy::{self, GatewayState};
use aegis_core::services::rate_limiter::RateLimiter;
use log::{error, info};
use tokio::signal;

/// Lower bound on how often the rate-limit map is swept, so a gateway with
/// only sub-second test windows configured doesn't spin the sweep loop.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Spawns the background task that bounds the rate limiter's counter map:
/// a counter is stale once its window ended more than one window ago.
fn spawn_rate_limiter_sweep(state: web::Data<GatewayState>, widest_window: Duration) {
    let interval = widest_window.max(MIN_SWEEP_INTERVAL);
    let stale_after = interval * 2;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            state.rate_limiter.sweep(stale_after);
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let gateway_config = config::load().unwrap_or_else(|e| {
        error!("configuration error: {e}");
        std::process::exit(1);
    });

    info!(
        "loaded {} route(s) from GATEWAY_ROUTES",
        gateway_config.routes.len()
    );

    let route_table = RouteTable::new(gateway_config.routes);
    let widest_window = route_table
        .iter()
        .map(|entry| entry.config.window)
        .max()
        .unwrap_or(MIN_SWEEP_INTERVAL);
    let rate_limiter = RateLimiter::new();
    let state = web::Data::new(GatewayState::new(
        route_table,
        rate_limiter,
        gateway_config.api_key,
    ));

    spawn_rate_limiter_sweep(state.clone(), widest_window);

    let host = std::env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("GATEWAY_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    info!("starting server on {host}:{port}");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .configure(status::configure)
            .default_service(web::route().to(proxy::handle))
    })
    .bind((host.as_str(), port))?
    .run();

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {e}"),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping server...");
        }
    }

    Ok(())
}
