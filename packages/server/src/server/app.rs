//! Application setup and server configuration.

use std::time::Duration;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::routes::{
    health_handler, receive_webhook_handler, submit_approval_handler, verify_webhook_handler,
};
use crate::server::worker::EventQueue;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub deps: ServerDeps,
    pub queue: EventQueue,
    pub verify_token: String,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/webhook",
            get(verify_webhook_handler).post(receive_webhook_handler),
        )
        .route("/approvals", post(submit_approval_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
