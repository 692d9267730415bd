use axum::extract::ws::Message;
use prost::Message as ProstMessage;

use crate::proto::ws::{envelope::Payload, Envelope, ErrorResponse};
use super::ConnectionHandle;

/// Encode a protobuf envelope as a binary WebSocket frame.
pub fn encode_envelope(envelope: &Envelope) -> Option<Message> {
    let mut buf = Vec::with_capacity(envelope.encoded_len());
    if envelope.encode(&mut buf).is_err() {
        return None;
    }
    Some(Message::Binary(buf.into()))
}

/// Push one pre-encoded frame to each handle.
/// Closed handles are skipped; returns how many pushes succeeded.
pub fn push_to_handles<'a, I>(handles: I, msg: &Message) -> usize
where
    I: IntoIterator<Item = &'a ConnectionHandle>,
{
    let mut delivered = 0;
    for handle in handles {
        if handle.push(msg.clone()) {
            delivered += 1;
        } else {
            tracing::debug!(connection_id = %handle.id(), "Dropped push to closed connection");
        }
    }
    delivered
}

/// Encode and send an envelope to a single handle.
pub fn send_envelope(handle: &ConnectionHandle, envelope: &Envelope) -> bool {
    match encode_envelope(envelope) {
        Some(msg) => handle.push(msg),
        None => false,
    }
}

/// Send an error response envelope.
pub fn send_error(handle: &ConnectionHandle, request_id: &str, code: u32, message: &str) {
    let envelope = Envelope {
        request_id: request_id.to_string(),
        payload: Some(Payload::Error(ErrorResponse {
            code,
            message: message.to_string(),
            request_id: request_id.to_string(),
        })),
    };
    send_envelope(handle, &envelope);
}
