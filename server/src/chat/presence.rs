//! Presence broadcast.
//!
//! Presence is always the full online set, never a delta: a client that
//! misses an event recovers on the next one. Broadcasts are driven by the
//! connection registry while it holds its lock.

use std::collections::BTreeSet;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::chat::model::UserId;
use crate::proto::presence::PresenceEvent;
use crate::proto::ws::{envelope::Payload, Envelope};
use crate::state::AppState;
use crate::ws::broadcast::{encode_envelope, push_to_handles, send_envelope};
use crate::ws::registry::Connections;
use crate::ws::ConnectionHandle;

fn presence_envelope(online: &BTreeSet<UserId>, request_id: &str) -> Envelope {
    Envelope {
        request_id: request_id.to_string(),
        payload: Some(Payload::PresenceEvent(PresenceEvent {
            online_user_ids: online.iter().cloned().collect(),
        })),
    }
}

/// Push the current online set to every registered connection.
/// Returns the number of connections that accepted the frame.
pub fn broadcast_presence(connections: &Connections) -> usize {
    let online = connections.online_users();
    let Some(frame) = encode_envelope(&presence_envelope(&online, "")) else {
        tracing::error!("Failed to encode presence event");
        return 0;
    };

    let delivered = push_to_handles(connections.handles(), &frame);
    tracing::debug!(
        online = online.len(),
        delivered = delivered,
        "Presence broadcast"
    );
    delivered
}

/// Send the online set to a single connection.
pub fn send_snapshot(handle: &ConnectionHandle, online: &BTreeSet<UserId>, request_id: &str) -> bool {
    send_envelope(handle, &presence_envelope(online, request_id))
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub online_user_ids: Vec<UserId>,
}

/// GET /api/presence -- Current online user ids. JWT auth required.
pub async fn get_presence(State(state): State<AppState>, _claims: Claims) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        online_user_ids: state.connections.online_users().into_iter().collect(),
    })
}
