use axum::{middleware, routing, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::admin::chat as admin_chat;
use crate::auth::middleware::JwtSecret;
use crate::chat::messages;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Success body shared by every REST endpoint: `{ "success": true, "data": ... }`.
/// Failures are rendered by `ChatError` as `{ "success": false, "message": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`;
/// the send endpoints and the socket handshake record the peer address.
pub fn build_router(state: AppState) -> Router {
    // User-facing chat routes (JWT required; Claims extractor validates token)
    let chat_routes = Router::new()
        .route("/api/chat/messages", routing::post(messages::send_message))
        .route("/api/chat/conversation", routing::get(messages::get_conversation))
        .route("/api/chat/messages/read", routing::put(messages::mark_read));

    // Admin routes (AdminClaims extractor additionally enforces the admin role)
    let admin_routes = Router::new()
        .route(
            "/api/admin/chat/conversations",
            routing::get(admin_chat::list_conversations),
        )
        .route(
            "/api/admin/chat/conversations/{user_id}",
            routing::get(admin_chat::get_user_conversation),
        )
        .route("/api/admin/chat/messages", routing::post(admin_chat::send_message))
        .route("/api/admin/chat/unread-count", routing::get(admin_chat::unread_count))
        .route("/api/admin/chat/statistics", routing::get(admin_chat::statistics))
        .route("/api/admin/chat/cleanup", routing::post(admin_chat::run_cleanup))
        .route(
            "/api/admin/chat/cleanup/status",
            routing::get(admin_chat::cleanup_status),
        );

    // WebSocket endpoint (auth via query param or bearer header)
    let ws_routes = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(chat_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("ok"))
}
