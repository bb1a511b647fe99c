pub mod auth;
pub mod chat;
pub mod extract;
pub mod messages;
pub mod state;
pub mod middleware;

pub use state::AppState;
pub use middleware::Identity;

use axum::{
    extract::State,
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
    timeout::TimeoutLayer,
};
use std::time::Duration;
use serde::Serialize;

use crate::db::StoreStats;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chat_service: String,
    stats: StoreStats,
}

pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    let protected = Router::new()
        // Session
        .route("/api/auth/session", get(auth::session))

        // Chat endpoints
        .route("/api/chats", get(chat::list_chats).post(chat::create_chat))
        .route(
            "/api/chats/:chat_id",
            get(chat::get_chat).patch(chat::rename_chat).delete(chat::delete_chat),
        )
        .route("/api/chats/:chat_id/messages", get(chat::list_messages))

        // Streaming turn endpoint
        .route("/api/messages", post(messages::send_message))

        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        // Health check
        .route("/api/health", get(health))

        // Identity bootstrap
        .route("/api/auth/init", post(auth::init))

        .merge(protected)
        // Bounds time-to-headers only; streamed bodies are not cut off
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chat_service: state.relay.service_name().to_string(),
        stats: state.store.stats().await,
    })
}
