//! Live fan-out of persisted messages to both parties of a conversation.
//!
//! Fire-and-forget: no acks, no retries, nothing recorded about who got what.
//! Callers must only invoke [`deliver`] after the message is durably stored.

use crate::chat::model::Message;
use crate::proto::chat::MessageDeliveredEvent;
use crate::proto::ws::{envelope::Payload, Envelope};
use crate::ws::broadcast::{encode_envelope, push_to_handles};
use crate::ws::ConnectionRegistry;

/// Push `message` to every live connection of its sender and receiver,
/// each connection at most once. Returns the number of successful pushes.
pub fn deliver(registry: &ConnectionRegistry, message: &Message) -> usize {
    let handles = registry.lookup_pair(&message.receiver_id, &message.sender_id);
    if handles.is_empty() {
        tracing::debug!(message_id = %message.id, "No live connections for delivery");
        return 0;
    }

    let envelope = Envelope {
        request_id: String::new(),
        payload: Some(Payload::MessageDeliveredEvent(MessageDeliveredEvent {
            message: Some(message.to_proto()),
        })),
    };
    let Some(frame) = encode_envelope(&envelope) else {
        tracing::error!(message_id = %message.id, "Failed to encode delivery event");
        return 0;
    };

    let delivered = push_to_handles(&handles, &frame);
    tracing::debug!(
        message_id = %message.id,
        sender_id = %message.sender_id,
        receiver_id = %message.receiver_id,
        targets = handles.len(),
        delivered = delivered,
        "Message delivered"
    );
    delivered
}
