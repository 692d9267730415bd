//! Unread tracking.
//!
//! Counts are always derived from the `is_read` flags in the store. There is
//! deliberately no server-side counter to keep in sync.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::chat::model::{Message, UserId};
use crate::chat::service::ChatError;
use crate::chat::store::{MessageStore, StoreError};
use crate::state::AppState;

/// Called after `message` is persisted. The unread row already exists, so
/// this only reads back the receiver's tally for that sender.
/// Returns `None` for messages created already read.
pub fn on_message_created(
    store: &dyn MessageStore,
    message: &Message,
) -> Result<Option<u64>, StoreError> {
    if message.is_read {
        return Ok(None);
    }
    let count = store.unread_count(&message.receiver_id, &message.sender_id)?;
    tracing::debug!(
        receiver_id = %message.receiver_id,
        sender_id = %message.sender_id,
        unread = count,
        "Unread tally updated"
    );
    Ok(Some(count))
}

/// Flip every unread message from `other` to `reader`. Idempotent.
pub fn mark_conversation_read(
    store: &dyn MessageStore,
    reader: &str,
    other: &str,
) -> Result<usize, StoreError> {
    let updated = store.mark_read(reader, other)?;
    if updated > 0 {
        tracing::debug!(reader = %reader, other = %other, updated = updated, "Conversation marked read");
    }
    Ok(updated)
}

pub fn unread_count(store: &dyn MessageStore, reader: &str, other: &str) -> Result<u64, StoreError> {
    store.unread_count(reader, other)
}

pub fn unread_aggregate(
    store: &dyn MessageStore,
    reader: &str,
) -> Result<BTreeMap<UserId, u64>, StoreError> {
    store.unread_aggregate(reader)
}

// --- REST endpoint handlers ---

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated_count: usize,
}

/// GET /api/messages/unread-count -- `{ sender_id: count }` for the caller.
pub async fn get_unread_counts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<BTreeMap<UserId, u64>>, StatusCode> {
    let store = state.messages.clone();
    let reader = claims.sub;

    let counts = tokio::task::spawn_blocking(move || unread_aggregate(store.as_ref(), &reader))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(ChatError::from)?;

    Ok(Json(counts))
}

/// PUT /api/messages/{id}/mark-read -- Mark everything from `id` to the caller as read.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(other_id): Path<String>,
) -> Result<Json<MarkReadResponse>, StatusCode> {
    let store = state.messages.clone();
    let reader = claims.sub;

    let updated_count =
        tokio::task::spawn_blocking(move || mark_conversation_read(store.as_ref(), &reader, &other_id))
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .map_err(ChatError::from)?;

    Ok(Json(MarkReadResponse { updated_count }))
}
