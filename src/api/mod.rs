pub mod handlers;
pub mod models;

use crate::browser_pool::BrowserPool;
use crate::cache::Cache;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::precheck::Precheck;
use crate::scan::ScanEngine;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use handlers::{domains_handler, health_check, AppState};
use std::sync::Arc;
use tracing::{error, info};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; DomainReconBot/1.0)";

/// Wires config → cache → browser pool → orchestrator → actix-web server, mirroring
/// `api::start_server`'s shape: build the shared state once, hand it to `HttpServer::new`
/// via `app_data`, and run until the listener is closed.
#[tracing::instrument(skip(config))]
pub async fn start_server(config: Config) -> Result<()> {
    info!(port = config.port, "starting domain reconnaissance server");

    let cache = Arc::new(Cache::open(&config.sqlite_path, config.cache_ttl_seconds)?);
    let browser_pool = Arc::new(BrowserPool::new(config.chromium_path.clone()));
    let precheck = Arc::new(Precheck::new(config.precheck_max_redirects)?);
    let scan_engine = Arc::new(ScanEngine::new(USER_AGENT)?);

    let orchestrator = Orchestrator::new(
        Arc::clone(&cache),
        Arc::clone(&browser_pool),
        Arc::clone(&precheck),
        Arc::clone(&scan_engine),
        config.clone(),
    );

    let state = web::Data::new(AppState {
        orchestrator,
        browser_pool: Arc::clone(&browser_pool),
        hard_timeout: config.hard_timeout,
    });

    let port = config.port;
    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(web::resource("/domains").route(web::get().to(domains_handler)))
            .service(web::resource("/health").route(web::get().to(health_check)))
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| {
        error!(port, error = %e, "failed to bind HTTP listener");
        e
    })?
    .run();

    tokio::select! {
        result = server_result => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    info!("server shutting down, closing browser pool");
    browser_pool.shutdown().await;

    Ok(())
}

/// Waits for SIGINT or, on unix, SIGTERM — matching spec.md §7's "signals trigger a
/// best-effort browser close before exit".
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "failed installing SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
