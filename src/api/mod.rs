pub mod auth;
pub mod billing;
pub mod generate;
pub mod keys;
pub mod requests;
pub mod usage;

use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};

use crate::AppState;
use crate::auth::middleware::require_auth;

/// Build the full API router.
///
/// Route layout:
/// ```text
/// /health                  GET    (no auth)
/// /v1/auth/signup          POST   (no auth)
/// /v1/auth/login           POST   (no auth)
/// /v1/billing/webhook      POST   (webhook secret)
/// /v1/user/me              GET    (bearer token)
/// /v1/keys                 POST   (bearer token)
/// /v1/keys                 GET    (bearer token)
/// /v1/keys/{id}            DELETE (bearer token)
/// /v1/generate             POST   (bearer token)
/// /v1/requests             GET    (bearer token)
/// /v1/usage                GET    (bearer token)
/// ```
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/v1/user/me", get(auth::me))
        .route("/v1/keys", post(keys::create_key))
        .route("/v1/keys", get(keys::list_keys))
        .route("/v1/keys/{id}", delete(keys::delete_key))
        .route("/v1/generate", post(generate::generate))
        .route("/v1/requests", get(requests::list_requests))
        .route("/v1/usage", get(usage::usage))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/auth/signup", post(auth::signup))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/billing/webhook", post(billing::webhook))
        .merge(protected)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
