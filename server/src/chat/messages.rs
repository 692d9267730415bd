//! REST endpoints for sending messages, conversation history and the sidebar.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::chat::model::Message;
use crate::chat::service::ChatService;
use crate::db::models::{PublicUser, User, USER_COLUMNS};
use crate::state::AppState;

/// Maximum message text length (chars).
const MAX_TEXT_LENGTH: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    /// Base64 or `data:image/...;base64,` payload.
    pub image: Option<String>,
}

/// POST /api/messages/send/{id}
/// Send a message to user `id`. JWT auth required.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(receiver_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), StatusCode> {
    if body
        .text
        .as_ref()
        .is_some_and(|t| t.chars().count() > MAX_TEXT_LENGTH)
    {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let message = ChatService::from_state(&state)
        .send_message(&claims.sub, &receiver_id, body.text, body.image)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{id}
/// Open the conversation with user `id`: marks their messages to the caller
/// as read, then returns the full history oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(other_id): Path<String>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let history = ChatService::from_state(&state)
        .open_conversation(&claims.sub, &other_id)
        .await?;
    Ok(Json(history))
}

/// GET /api/messages/users
/// Every user except the caller, for the sidebar.
pub async fn list_users(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<PublicUser>>, StatusCode> {
    let db = state.db.clone();

    let users = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY full_name COLLATE NOCASE, id"
            ))
            .map_err(|e| {
                tracing::error!("Failed to prepare user listing: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let users = stmt
            .query_map(rusqlite::params![claims.sub], User::from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| {
                tracing::error!("Failed to list users: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        Ok::<_, StatusCode>(users.into_iter().map(PublicUser::from).collect::<Vec<_>>())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(users))
}
