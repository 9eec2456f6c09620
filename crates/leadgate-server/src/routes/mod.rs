//! HTTP route handlers.
//!
//! Public routes: `/v1/subscribe`, `/v1/documents/download`, `/v1/sys/health`.
//! Admin routes: `/v1/bot-detection/*`, behind [`admin_middleware`].

pub mod documents;
pub mod subscribe;
pub mod sys;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{ADMIN_TOKEN_HEADER, admin_middleware};
use crate::state::AppState;

/// Concurrent in-flight subscription requests.
const SUBSCRIBE_CONCURRENCY: usize = 64;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .nest("/v1/bot-detection", telemetry::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            admin_middleware,
        ));

    let subscribe_routes = Router::new()
        .nest("/v1", subscribe::router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(SUBSCRIBE_CONCURRENCY));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ]);

    Router::new()
        .merge(subscribe_routes)
        .merge(admin_routes)
        .nest("/v1/documents", documents::router())
        .nest("/v1/sys", sys::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        // The document download sets its own caching policy.
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
