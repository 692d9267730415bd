use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection: `?token=JWT`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
/// On auth failure, upgrades then immediately closes with the matching code.
/// Without a token the socket is served anonymously.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        tracing::debug!("WebSocket connection without token");
        return ws.on_upgrade(move |socket| actor::run_connection(socket, state, None));
    };

    match jwt::validate_access_token(&state.jwt_secret, &token) {
        Ok(claims) => {
            tracing::info!(user_id = %claims.sub, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, Some(claims.sub)))
        }
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };

            tracing::warn!(
                close_code = close_code,
                reason = reason,
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |socket| close_with(socket, close_code, reason))
        }
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
