//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the websocket endpoint, the AI review API and the health
//! check under a single Axum router. Everything else falls through to the
//! static frontend, with `index.html` served for client-side routes such as
//! `/b/{board_id}`.

pub mod ai;
pub mod ws;

use std::path::PathBuf;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const DEFAULT_STATIC_DIR: &str = "./frontend";

/// API and websocket routes.
fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/ws/{board_id}", get(ws::handle_ws))
        .route("/api/ai", post(ai::handle_ai))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Resolve the directory holding the built frontend.
fn static_dir() -> PathBuf {
    std::env::var("STATIC_DIR").map_or_else(|_| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from)
}

/// Full application router: API routes plus the static frontend.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let dir = static_dir();
    let frontend = ServeDir::new(&dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(dir.join("index.html")));

    api_routes(state)
        .fallback_service(frontend)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
