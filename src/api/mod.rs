//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api`:
//! - Locker administration, reservations and quotes
//! - Reconciler trigger and status
//! - Auth (register / login / logout / me) and user lookup
//!
//! `/health` sits outside the prefix and needs no session.

pub mod auth;
pub mod lockers;
pub mod middleware;
pub mod responses;
pub mod users;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, ApiJson, ApiPath, AppState, AuthenticatedUser};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/lockers", lockers::router())
        .nest("/users", users::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", state.config.server.cors_origin))?;

    // Credentials are allowed so the session cookie crosses origins
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/health", get(health))
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.pool.ping().await.map_err(ApiError::internal_error)?;
    Ok(Json(json!({ "status": "ok" })))
}
