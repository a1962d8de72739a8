//! `GET /gateway/status`: an unauthenticated diagnostic endpoint reporting
//! uptime and per-route health, registered ahead of the catch-all proxy
//! handler so it never passes through the proxy pipeline.

use actix_web::{web, HttpResponse};

use crate::services::proxy::GatewayState;

async fn status(state: web::Data<GatewayState>) -> HttpResponse {
    let snapshot = state.metrics.snapshot(&state.routes);
    HttpResponse::Ok().json(snapshot)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/gateway/status", web::get().to(status));
}
