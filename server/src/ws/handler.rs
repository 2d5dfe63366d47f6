use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::auth::middleware::{bearer_token, Claims};
use crate::chat::store;
use crate::db::models::{Identity, MessageMetadata};
use crate::db::run_blocking;
use crate::state::AppState;
use crate::ws::actor;

/// Credential may come as `?token=` or as a bearer header.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token missing or invalid
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
/// On auth failure, upgrades then immediately closes with the matching code,
/// so nothing is ever registered for an unauthenticated socket.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string));

    let identity = match token {
        Some(token) => jwt::validate_access_token(&state.jwt_secret, &token)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            })
            .map(Claims::into_identity),
        None => Err((CLOSE_TOKEN_INVALID, "Token missing")),
    };

    match identity {
        Ok(identity) => {
            let metadata = connection_metadata(&headers, peer);
            tracing::info!(
                user_id = %identity.id,
                role = identity.role.as_str(),
                ip = ?metadata.ip_address,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, identity, metadata))
        }
        Err((close_code, reason)) => {
            tracing::warn!(close_code, reason, "WebSocket auth failed");

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Mirror the identity locally, then hand the socket to its actor.
async fn handle_authenticated(
    socket: WebSocket,
    state: AppState,
    identity: Identity,
    metadata: MessageMetadata,
) {
    let mirror = identity.clone();
    if let Err(e) = run_blocking(&state.db, move |db| store::upsert_identity(db, &mirror)).await {
        tracing::error!(user_id = %identity.id, error = %e, "Failed to record identity");
    }
    actor::run_connection(socket, state, identity, metadata).await;
}

/// Per-connection metadata stamped on every message sent over it.
pub fn connection_metadata(headers: &HeaderMap, peer: SocketAddr) -> MessageMetadata {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    MessageMetadata {
        ip_address: Some(forwarded.unwrap_or_else(|| peer.ip().to_string())),
        device_info: user_agent.as_deref().map(|ua| device_class(ua).to_string()),
        user_agent,
    }
}

/// Coarse device class from a User-Agent string.
fn device_class(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("ipad") || ua.contains("tablet") {
        "tablet"
    } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        "mobile"
    } else {
        "desktop"
    }
}
