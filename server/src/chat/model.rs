//! Message record shared by the store, the delivery router and the client consumer.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::proto::chat as proto_chat;

/// Opaque, stable user identifier (UUIDv7 assigned at registration).
pub type UserId = String;

/// A persisted direct message.
///
/// Everything except `is_read` is immutable once stored; `is_read` only ever
/// moves from `false` to `true`, and only for the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    /// True when `user` is either party of this message.
    pub fn involves(&self, user: &str) -> bool {
        self.sender_id == user || self.receiver_id == user
    }

    pub fn to_proto(&self) -> proto_chat::ChatMessage {
        proto_chat::ChatMessage {
            id: self.id.clone(),
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            text: self.text.clone(),
            image: self.image.clone(),
            created_at: self.created_at.timestamp_millis(),
            is_read: self.is_read,
        }
    }

    /// Returns `None` if the timestamp is out of chrono's range.
    pub fn from_proto(msg: proto_chat::ChatMessage) -> Option<Self> {
        let created_at = Utc.timestamp_millis_opt(msg.created_at).single()?;
        Some(Self {
            id: msg.id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            text: msg.text,
            image: msg.image,
            created_at,
            is_read: msg.is_read,
        })
    }
}

/// Input to [`MessageStore::create`](crate::chat::store::MessageStore::create).
/// The store assigns `id` and `created_at`; new messages start unread.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    pub image: Option<String>,
}
