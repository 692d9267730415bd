//! The send and open-conversation paths.
//!
//! Ordering is fixed: persist, then deliver, then update unread. Nothing is
//! pushed to a connection for a message that failed to store.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::chat::delivery;
use crate::chat::model::{Message, NewMessage};
use crate::chat::store::{MessageStore, StoreError};
use crate::chat::unread;
use crate::media::{ImageStore, MediaError};
use crate::state::AppState;
use crate::ws::ConnectionRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message must have text or an image")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ChatError> for StatusCode {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            ChatError::Store(StoreError::UnknownUser(_)) => StatusCode::NOT_FOUND,
            ChatError::Media(MediaError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ChatError::Media(
                MediaError::InvalidEncoding | MediaError::UnsupportedType(_) | MediaError::InvalidName,
            ) => StatusCode::BAD_REQUEST,
            err => {
                tracing::error!("Chat operation failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Ties the message store to the live connection registry.
#[derive(Clone)]
pub struct ChatService {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn MessageStore>,
    images: Arc<dyn ImageStore>,
}

impl ChatService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn MessageStore>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            registry,
            store,
            images,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.connections.clone(),
            state.messages.clone(),
            state.images.clone(),
        )
    }

    /// Persist a message from `sender` to `receiver`, then push it to both
    /// parties' live connections and refresh the receiver's unread tally.
    pub async fn send_message(
        &self,
        sender: &str,
        receiver: &str,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message, ChatError> {
        let text = text.filter(|t| !t.trim().is_empty());
        let image = image.filter(|i| !i.trim().is_empty());
        if text.is_none() && image.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let image = match image {
            Some(encoded) => {
                let images = self.images.clone();
                Some(tokio::task::spawn_blocking(move || images.put(&encoded)).await??)
            }
            None => None,
        };

        let new = NewMessage {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            text,
            image,
        };
        let store = self.store.clone();
        let message = tokio::task::spawn_blocking(move || store.create(new)).await??;

        tracing::info!(
            message_id = %message.id,
            sender_id = %message.sender_id,
            receiver_id = %message.receiver_id,
            "Message stored"
        );

        delivery::deliver(&self.registry, &message);

        // The message is already durable; an unread read-back failure only
        // costs a log line.
        let store = self.store.clone();
        let stored = message.clone();
        match tokio::task::spawn_blocking(move || unread::on_message_created(store.as_ref(), &stored))
            .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(message_id = %message.id, "Unread refresh failed: {}", e),
            Err(e) => tracing::warn!(message_id = %message.id, "Unread refresh task failed: {}", e),
        }

        Ok(message)
    }

    /// Mark everything `other` sent to `reader` as read, then return the
    /// conversation. History is only read after the mark-read commits.
    pub async fn open_conversation(&self, reader: &str, other: &str) -> Result<Vec<Message>, ChatError> {
        let store = self.store.clone();
        let reader = reader.to_string();
        let other = other.to_string();

        let history = tokio::task::spawn_blocking(move || {
            unread::mark_conversation_read(store.as_ref(), &reader, &other)?;
            store.conversation(&reader, &other)
        })
        .await??;

        Ok(history)
    }
}
