//! Router assembly. The JSON API is nested under `/api/v1`; the WebSocket
//! session lives at `/ws`; anything else falls through to the static SPA.

use std::sync::Arc;

use axum::{http::header, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod extract;
pub mod http;
pub mod ws;

pub const STATIC_DIR: &str = "./static";

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(http::http_health))
        .route("/exercise", get(http::http_get_exercise))
        .route(
            "/settings/exam",
            get(http::http_get_exam_settings).put(http::http_put_exam_settings),
        )
        .route(
            "/preferences",
            get(http::http_get_preferences).put(http::http_put_preferences),
        )
        .route(
            "/history",
            get(http::http_get_history)
                .post(http::http_post_history)
                .delete(http::http_delete_history),
        )
        .route("/history/export", get(http::http_export_history))
        .route("/placement/recommendation", get(http::http_get_recommendation))
}

/// Build the application router: `/ws`, `/api/v1/...`, CORS, per-request
/// trace spans, and the SPA fallback with `index.html` for unknown paths.
pub fn build_router(state: Arc<AppState>) -> Router {
    let spa = ServeDir::new(STATIC_DIR)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{STATIC_DIR}/index.html")));

    // Browsers only see the export filename if the header is exposed.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(spa)
}
