//! Web frontend: browse saved pages, add new ones, and trigger archiving or
//! e-reader delivery.

mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use satchel_core::{Config, Database, Processor, Result};

use crate::handlers::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let cfg = Arc::new(Config::load(&config_path)?);

    let db = Arc::new(Database::open(&cfg.database)?);
    let processor = Arc::new(Processor::new(Arc::clone(&cfg))?);
    let state = AppState { cfg: Arc::clone(&cfg), db, processor };

    // Everything except the login form and static assets requires a session.
    let protected = Router::new()
        .route("/", get(handlers::list))
        .route("/add", get(handlers::add).post(handlers::add_form))
        .route("/archive", get(handlers::archive))
        .route("/kindle", get(handlers::kindle))
        .nest_service("/pages", ServeDir::new(&cfg.page_dir))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::require_session));

    let app = Router::new()
        .route("/auth", get(handlers::auth_form).post(handlers::auth))
        .nest_service("/static", ServeDir::new(&cfg.static_dir))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    // Serve under the base URL's path component when there is one; TLS and
    // virtual hosting belong to a fronting proxy.
    let base = cfg.base_path();
    let app = if base.is_empty() { app } else { Router::new().nest(&base, app) };

    let listener = tokio::net::TcpListener::bind(&cfg.listen_address).await?;
    info!(address = %cfg.listen_address, "accepting connections");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
