use crate::api::models::{DomainQuery, DomainResponseBody, ErrorBody, HealthBody};
use crate::browser_pool::BrowserPool;
use crate::error::ErrorCode;
use crate::orchestrator::Orchestrator;
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Shared application state handed to every handler via `web::Data`.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub browser_pool: Arc<BrowserPool>,
    pub hard_timeout: Duration,
}

/// `GET /domains?domain=<raw>` (spec.md §6).
///
/// Wraps [`Orchestrator::resolve`] in the request's hard deadline; a 504 is returned only
/// when that deadline expires before the orchestrator produces a response, per spec.md
/// §7's "hard timeout surfaced as 504 iff no earlier response has been sent".
#[instrument(skip(state), fields(domain = %query.domain))]
pub async fn domains_handler(
    query: web::Query<DomainQuery>,
    state: web::Data<AppState>,
) -> impl Responder {
    info!("received /domains request");

    match tokio::time::timeout(state.hard_timeout, state.orchestrator.resolve(&query.domain)).await {
        Ok(Ok(response)) => {
            let body: DomainResponseBody = response.into();
            HttpResponse::Ok().json(body)
        }
        Ok(Err(e)) => {
            warn!(code = %e.code, "request resolved to an error");
            let status = actix_web::http::StatusCode::from_u16(e.code.http_status())
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status).json(ErrorBody { error: e.message, code: e.code.to_string() })
        }
        Err(_) => {
            error!("request exceeded the hard deadline");
            HttpResponse::build(
                actix_web::http::StatusCode::from_u16(ErrorCode::Timeout.http_status()).unwrap(),
            )
            .json(ErrorBody { error: "request exceeded the hard deadline".to_string(), code: ErrorCode::Timeout.to_string() })
        }
    }
}

/// `GET /health` (spec.md §6, extended per SPEC_FULL.md to report browser pool state).
#[instrument(skip(state))]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let browser = if state.browser_pool.is_connected().await { "connected" } else { "absent" };
    HttpResponse::Ok().json(HealthBody { ok: true, browser })
}
