use prost::Message as ProstMessage;

use crate::chat::unread;
use crate::proto::chat::MarkReadResponse;
use crate::proto::ws::{envelope::Payload, Envelope};
use crate::state::AppState;
use crate::ws::broadcast::{send_envelope, send_error};
use crate::ws::ConnectionHandle;

/// Handle an incoming binary (protobuf) message.
/// Decodes the Envelope, dispatches based on payload type, sends response.
/// `user_id` is `None` for sockets opened without a token.
pub async fn handle_binary_message(
    data: &[u8],
    handle: &ConnectionHandle,
    state: &AppState,
    user_id: Option<&str>,
) {
    let envelope = match Envelope::decode(data) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(
                connection_id = %handle.id(),
                error = %e,
                "Failed to decode protobuf Envelope"
            );
            send_error(handle, "", 400, "Invalid protobuf message");
            return;
        }
    };

    let request_id = envelope.request_id;

    let Some(payload) = envelope.payload else {
        send_error(handle, &request_id, 400, "Empty payload");
        return;
    };

    let Some(user_id) = user_id else {
        send_error(handle, &request_id, 401, "Not authenticated");
        return;
    };

    dispatch_payload(payload, &request_id, handle, state, user_id).await;
}

async fn dispatch_payload(
    payload: Payload,
    request_id: &str,
    handle: &ConnectionHandle,
    state: &AppState,
    user_id: &str,
) {
    match payload {
        Payload::PresenceRequest(_) => {
            state.connections.send_snapshot_to(handle, request_id);
        }
        Payload::MarkReadRequest(req) => {
            handle_mark_read(&req.other_user_id, request_id, handle, state, user_id).await;
        }
        _ => {
            tracing::debug!(
                user_id = %user_id,
                request_id = %request_id,
                "Unhandled payload type"
            );
            send_error(handle, request_id, 400, "Unexpected payload type");
        }
    }
}

async fn handle_mark_read(
    other_user_id: &str,
    request_id: &str,
    handle: &ConnectionHandle,
    state: &AppState,
    user_id: &str,
) {
    if other_user_id.is_empty() {
        send_error(handle, request_id, 400, "other_user_id is required");
        return;
    }

    let store = state.messages.clone();
    let reader = user_id.to_string();
    let other = other_user_id.to_string();

    let result = tokio::task::spawn_blocking(move || {
        unread::mark_conversation_read(store.as_ref(), &reader, &other)
    })
    .await;

    match result {
        Ok(Ok(updated)) => {
            let response = Envelope {
                request_id: request_id.to_string(),
                payload: Some(Payload::MarkReadResponse(MarkReadResponse {
                    updated: updated as u64,
                })),
            };
            send_envelope(handle, &response);
        }
        Ok(Err(e)) => {
            tracing::error!(user_id = %user_id, "Mark-read over WebSocket failed: {}", e);
            send_error(handle, request_id, 500, "Failed to mark conversation read");
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, "Mark-read task failed: {}", e);
            send_error(handle, request_id, 500, "Failed to mark conversation read");
        }
    }
}
