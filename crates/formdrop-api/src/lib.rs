pub mod auth;
pub mod error;
pub mod extract;
pub mod forms;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod session;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// All HTTP routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/forms/{unique_id}/messages", post(messages::submit))
        .route("/api/form/{unique_id}", post(messages::submit))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/forms", get(forms::list).post(forms::create))
        .route("/forms/{unique_id}", get(forms::detail).delete(forms::remove))
        .route("/messages/{message_id}/reply", post(messages::reply))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
