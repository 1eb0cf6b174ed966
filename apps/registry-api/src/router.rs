//! Route table.

use crate::handlers::{firmware, health, webhooks};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use fwreg_auth::require_admin;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Build the application router.
///
/// Firmware routes pick their role per method through extractors; the
/// webhook routes are admin-only as a group.
pub fn build_router(state: AppState) -> Router {
    let firmware_routes = Router::new()
        .route("/api/firmware/{type}", get(firmware::list))
        .route("/api/firmware/{type}/latest", get(firmware::latest))
        .route(
            "/api/firmware/{type}/{version}",
            post(firmware::upload)
                .get(firmware::download)
                .delete(firmware::delete),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_upload_bytes));

    let webhook_routes = Router::new()
        .route("/api/webhooks", get(webhooks::list).post(webhooks::create))
        .route(
            "/api/webhooks/{id}",
            put(webhooks::update).delete(webhooks::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_admin,
        ));

    Router::new()
        .route("/api/health", get(health::health))
        .merge(firmware_routes)
        .merge(webhook_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
