pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod extractor;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod store;
pub mod swagger;

use config::Config;
use db::Database;
use notify::Hub;
use pipeline::deps::Deps;
use std::sync::Arc;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub deps: Deps,
}

/// Liveness probe. Unauthenticated by design -- load balancers hit this.
pub async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "labscribe",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
