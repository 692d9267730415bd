use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::ConnectionHandle;

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming messages, dispatches to protocol handlers
///
/// Authenticated sockets are registered under `user_id` for their whole
/// lifetime and unregistered on every exit path. Anonymous sockets stay open
/// but never appear in presence or receive deliveries.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(tx.clone());

    // Frames queued by register() are flushed once the writer starts.
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    if let Some(user_id) = &user_id {
        let membership = state.connections.register(user_id, handle.clone());
        tracing::info!(
            user_id = %user_id,
            connection_id = %handle.id(),
            membership = ?membership,
            "WebSocket actor started"
        );
    } else {
        tracing::info!(connection_id = %handle.id(), "Anonymous WebSocket opened");
    }

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Binary(data) => {
                    protocol::handle_binary_message(&data, &handle, &state, user_id.as_deref()).await;
                }
                Message::Text(text) => {
                    tracing::debug!(
                        connection_id = %handle.id(),
                        "Received text message (expected binary protobuf): {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %handle.id(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %handle.id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %handle.id(), "WebSocket stream ended");
                break;
            }
        }
    }

    // A ping timeout closes the sink but not the stream; the reader still
    // exits once the peer goes away, so cleanup below always runs.
    writer_handle.abort();
    ping_handle.abort();

    if let Some(user_id) = &user_id {
        let membership = state.connections.unregister(handle.id());
        tracing::info!(
            user_id = %user_id,
            connection_id = %handle.id(),
            membership = ?membership,
            "WebSocket actor stopped"
        );
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
