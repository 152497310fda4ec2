pub mod auth;
pub mod lab_reports;
pub mod ocr_data;
pub mod workspaces;
pub mod ws;

use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::health_check))
        .route("/login", post(auth::login))
        .route(
            "/ocrdata/batch/{workspace_id}",
            post(ocr_data::create_batch),
        )
        .route(
            "/ocrdata/workspace/{workspace_id}",
            get(ocr_data::list_for_workspace),
        )
        .route("/ocrdata/{id}", get(ocr_data::get_one))
        .route("/ocrdata/batch", delete(ocr_data::delete_batch))
        .route("/labreport/{id}", get(lab_reports::get_one))
        .route("/labreport/search", post(lab_reports::search))
        .route("/labreportitem/{id}", put(lab_reports::update_item))
        .route("/workspace/create", post(workspaces::create))
        .route("/workspace", get(workspaces::list))
        .route("/workspace/delete/{id}", post(workspaces::delete))
        .route("/ws", get(ws::upgrade))
        .merge(crate::swagger::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
