//! Axum router configuration with middleware.
//!
//! REST routes live under `/api/v1/`; the real-time endpoint is `/ws`.
//! Middleware: CORS, request tracing.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/chats",
            get(handlers::chat::list_chats).post(handlers::chat::create_chat),
        )
        .route("/chats/{id}", get(handlers::chat::get_chat))
        .route("/chats/{id}/assign", post(handlers::chat::assign_chat))
        .route("/chats/{id}/close", post(handlers::chat::close_chat))
        .route("/chats/{id}/messages", get(handlers::chat::list_messages));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus hub occupancy (no auth required).
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let registry = state.hub.registry();
    Json(serde_json::json!({
        "status": if state.hub.is_shutting_down() { "draining" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "online_identities": registry.online_count(),
        "live_connections": registry.connection_count(),
    }))
}
