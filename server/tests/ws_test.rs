//! Integration tests for WebSocket auth, presence broadcast and live delivery.

use futures_util::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use chatosi_server::chat::model::Message as ChatMessage;
use chatosi_server::chat::store::SqliteMessageStore;
use chatosi_server::client::{ClientSession, Outcome};
use chatosi_server::media::DiskImageStore;
use chatosi_server::proto::chat::MarkReadRequest;
use chatosi_server::proto::presence::PresenceRequest;
use chatosi_server::proto::ws::{envelope::Payload, Envelope};
use chatosi_server::ws::ConnectionRegistry;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsRead = futures_util::stream::SplitStream<WsStream>;
type WsWrite = futures_util::stream::SplitSink<WsStream, Message>;

struct TestServer {
    base_url: String,
    addr: SocketAddr,
    jwt_secret: Vec<u8>,
}

/// Helper: start the server on a random port.
async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = chatosi_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = chatosi_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = chatosi_server::state::AppState {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        token_ttl_secs: 3600,
        bcrypt_cost: 4,
        max_body_bytes: 1024 * 1024,
        connections: Arc::new(ConnectionRegistry::new()),
        messages: Arc::new(SqliteMessageStore::new(db)),
        images: Arc::new(DiskImageStore::new(&data_dir, 64 * 1024)),
    };

    let app = chatosi_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        jwt_secret,
    }
}

/// Register a user and return (token, user_id).
async fn register_user(base_url: &str, name: &str) -> (String, String) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "email": format!("{}@example.com", name),
            "full_name": name,
            "password": "hunter22",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Registration failed for {}", name);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

async fn send_message(base_url: &str, token: &str, to: &str, text: &str) -> ChatMessage {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/messages/send/{}", base_url, to))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "text": text }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn connect(addr: SocketAddr, token: Option<&str>) -> (WsWrite, WsRead) {
    let url = match token {
        Some(token) => format!("ws://{}/ws?token={}", addr, token),
        None => format!("ws://{}/ws", addr),
    };
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("WebSocket connect failed");
    stream.split()
}

/// Next binary frame, skipping control frames. Panics after 2s.
async fn next_frame(read: &mut WsRead) -> Vec<u8> {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), read.next()).await {
            Ok(Some(Ok(Message::Binary(data)))) => return data.to_vec(),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            other => panic!("expected a binary frame, got {:?}", other),
        }
    }
}

async fn next_envelope(read: &mut WsRead) -> Envelope {
    Envelope::decode(next_frame(read).await.as_slice()).expect("valid envelope")
}

async fn next_presence(read: &mut WsRead) -> Vec<String> {
    match next_envelope(read).await.payload {
        Some(Payload::PresenceEvent(ev)) => ev.online_user_ids,
        other => panic!("expected presence, got {:?}", other),
    }
}

async fn next_delivery(read: &mut WsRead) -> String {
    match next_envelope(read).await.payload {
        Some(Payload::MessageDeliveredEvent(ev)) => ev.message.unwrap().id,
        other => panic!("expected delivery, got {:?}", other),
    }
}

/// Assert no binary frame arrives for a short while.
async fn assert_silent(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_millis(300), read.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {:?}", other),
        }
    }
}

/// Consume whatever presence traffic is queued.
async fn drain(read: &mut WsRead) {
    while let Ok(Some(Ok(_))) = tokio::time::timeout(Duration::from_millis(300), read.next()).await {}
}

async fn send_envelope(write: &mut WsWrite, request_id: &str, payload: Payload) {
    let envelope = Envelope {
        request_id: request_id.to_string(),
        payload: Some(payload),
    };
    write
        .send(Message::Binary(envelope.encode_to_vec().into()))
        .await
        .unwrap();
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_presence_follows_first_and_last_connection() {
    let server = start_test_server().await;
    let (alice_token, alice) = register_user(&server.base_url, "alice").await;
    let (bob_token, bob) = register_user(&server.base_url, "bob").await;

    let (_alice_w, mut alice_r) = connect(server.addr, Some(&alice_token)).await;
    assert_eq!(next_presence(&mut alice_r).await, vec![alice.clone()]);

    let (mut bob_w, mut bob_r) = connect(server.addr, Some(&bob_token)).await;
    let both = sorted(vec![alice.clone(), bob.clone()]);
    assert_eq!(next_presence(&mut bob_r).await, both);
    assert_eq!(next_presence(&mut alice_r).await, both);

    bob_w.send(Message::Close(None)).await.unwrap();
    assert_eq!(next_presence(&mut alice_r).await, vec![alice.clone()]);
}

#[tokio::test]
async fn test_second_tab_gets_snapshot_without_broadcast() {
    let server = start_test_server().await;
    let (alice_token, alice) = register_user(&server.base_url, "alice").await;
    let (bob_token, bob) = register_user(&server.base_url, "bob").await;

    let (_alice_w, mut alice_r) = connect(server.addr, Some(&alice_token)).await;
    next_presence(&mut alice_r).await;
    let (mut bob1_w, mut bob1_r) = connect(server.addr, Some(&bob_token)).await;
    next_presence(&mut bob1_r).await;
    next_presence(&mut alice_r).await;

    // Second tab: only the new tab hears about it.
    let (mut bob2_w, mut bob2_r) = connect(server.addr, Some(&bob_token)).await;
    let both = sorted(vec![alice.clone(), bob.clone()]);
    assert_eq!(next_presence(&mut bob2_r).await, both);
    assert_silent(&mut alice_r).await;
    assert_silent(&mut bob1_r).await;

    // Closing one of two tabs keeps Bob online.
    bob1_w.send(Message::Close(None)).await.unwrap();
    assert_silent(&mut alice_r).await;

    bob2_w.send(Message::Close(None)).await.unwrap();
    assert_eq!(next_presence(&mut alice_r).await, vec![alice]);
}

#[tokio::test]
async fn test_invalid_and_expired_tokens_close_with_codes() {
    let server = start_test_server().await;
    let (_, user_id) = register_user(&server.base_url, "carol").await;

    let expired =
        chatosi_server::auth::jwt::issue_access_token(&server.jwt_secret, &user_id, -3600).unwrap();

    for (token, expected) in [("garbage", 4002u16), (expired.as_str(), 4001u16)] {
        let (_w, mut r) = connect(server.addr, Some(token)).await;
        match tokio::time::timeout(Duration::from_secs(2), r.next()).await {
            Ok(Some(Ok(Message::Close(Some(frame))))) => {
                assert_eq!(u16::from(frame.code), expected);
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_anonymous_socket_is_invisible() {
    let server = start_test_server().await;
    let (alice_token, alice) = register_user(&server.base_url, "alice").await;

    let (_alice_w, mut alice_r) = connect(server.addr, Some(&alice_token)).await;
    next_presence(&mut alice_r).await;

    let (mut anon_w, mut anon_r) = connect(server.addr, None).await;
    assert_silent(&mut anon_r).await;
    assert_silent(&mut alice_r).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/presence", server.base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["online_user_ids"], json!([alice]));

    // Requests on an anonymous socket are refused, but it stays open.
    send_envelope(&mut anon_w, "req-1", Payload::PresenceRequest(PresenceRequest {})).await;
    match next_envelope(&mut anon_r).await.payload {
        Some(Payload::Error(err)) => {
            assert_eq!(err.code, 401);
            assert_eq!(err.request_id, "req-1");
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_message_reaches_every_tab_of_both_parties() {
    let server = start_test_server().await;
    let (alice_token, _alice) = register_user(&server.base_url, "alice").await;
    let (bob_token, bob) = register_user(&server.base_url, "bob").await;
    let (carol_token, _carol) = register_user(&server.base_url, "carol").await;

    let (_a1w, mut alice1) = connect(server.addr, Some(&alice_token)).await;
    let (_a2w, mut alice2) = connect(server.addr, Some(&alice_token)).await;
    let (_bw, mut bob_r) = connect(server.addr, Some(&bob_token)).await;
    let (_cw, mut carol_r) = connect(server.addr, Some(&carol_token)).await;
    for read in [&mut alice1, &mut alice2, &mut bob_r, &mut carol_r] {
        drain(read).await;
    }

    let sent = send_message(&server.base_url, &alice_token, &bob, "hello bob").await;

    assert_eq!(next_delivery(&mut alice1).await, sent.id);
    assert_eq!(next_delivery(&mut alice2).await, sent.id);
    assert_eq!(next_delivery(&mut bob_r).await, sent.id);
    assert_silent(&mut carol_r).await;
    // Exactly one push per tab.
    assert_silent(&mut bob_r).await;
}

#[tokio::test]
async fn test_offline_receiver_sees_message_only_through_history() {
    let server = start_test_server().await;
    let (alice_token, alice) = register_user(&server.base_url, "alice").await;
    let (bob_token, bob) = register_user(&server.base_url, "bob").await;

    let sent = send_message(&server.base_url, &alice_token, &bob, "while you were out").await;

    // No store-and-forward: a later connection only gets presence.
    let (_bw, mut bob_r) = connect(server.addr, Some(&bob_token)).await;
    next_presence(&mut bob_r).await;
    assert_silent(&mut bob_r).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/messages/{}", server.base_url, alice))
        .header("Authorization", format!("Bearer {}", bob_token))
        .send()
        .await
        .unwrap();
    let history: Vec<ChatMessage> = resp.json().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);
    assert!(history[0].is_read);
}

#[tokio::test]
async fn test_socket_requests_echo_request_ids() {
    let server = start_test_server().await;
    let (alice_token, alice) = register_user(&server.base_url, "alice").await;
    let (bob_token, bob) = register_user(&server.base_url, "bob").await;

    send_message(&server.base_url, &alice_token, &bob, "one").await;
    send_message(&server.base_url, &alice_token, &bob, "two").await;

    let (mut bob_w, mut bob_r) = connect(server.addr, Some(&bob_token)).await;
    next_presence(&mut bob_r).await;

    send_envelope(&mut bob_w, "p-1", Payload::PresenceRequest(PresenceRequest {})).await;
    let reply = next_envelope(&mut bob_r).await;
    assert_eq!(reply.request_id, "p-1");
    assert!(matches!(reply.payload, Some(Payload::PresenceEvent(ref ev)) if ev.online_user_ids == vec![bob.clone()]));

    send_envelope(
        &mut bob_w,
        "m-1",
        Payload::MarkReadRequest(MarkReadRequest {
            other_user_id: alice.clone(),
        }),
    )
    .await;
    let reply = next_envelope(&mut bob_r).await;
    assert_eq!(reply.request_id, "m-1");
    match reply.payload {
        Some(Payload::MarkReadResponse(resp)) => assert_eq!(resp.updated, 2),
        other => panic!("expected mark-read response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_sessions_converge_across_tabs() {
    let server = start_test_server().await;
    let (alice_token, alice) = register_user(&server.base_url, "alice").await;
    let (bob_token, bob) = register_user(&server.base_url, "bob").await;

    let (_a1w, mut tab1_r) = connect(server.addr, Some(&alice_token)).await;
    let (_a2w, mut tab2_r) = connect(server.addr, Some(&alice_token)).await;
    let (_bw, mut bob_r) = connect(server.addr, Some(&bob_token)).await;
    for read in [&mut tab1_r, &mut tab2_r, &mut bob_r] {
        drain(read).await;
    }

    let mut tab1 = ClientSession::new(alice.clone());
    let mut tab2 = ClientSession::new(alice.clone());
    let mut bob_session = ClientSession::new(bob.clone());
    let _s1 = tab1.subscribe().unwrap();
    let _s2 = tab2.subscribe().unwrap();
    let _sb = bob_session.subscribe().unwrap();
    tab1.state_mut().open_conversation(bob.clone(), Vec::new());
    tab2.state_mut().open_conversation(bob.clone(), Vec::new());

    // Tab 1 sends; it sees its own HTTP response first, then the push.
    let sent = send_message(&server.base_url, &alice_token, &bob, "from tab 1").await;
    assert_eq!(tab1.state_mut().record_sent(sent.clone()), Outcome::Appended);
    assert_eq!(
        tab1.dispatch_frame(&next_frame(&mut tab1_r).await).unwrap(),
        Some(Outcome::Duplicate)
    );
    assert_eq!(
        tab2.dispatch_frame(&next_frame(&mut tab2_r).await).unwrap(),
        Some(Outcome::Appended)
    );
    assert_eq!(
        bob_session.dispatch_frame(&next_frame(&mut bob_r).await).unwrap(),
        Some(Outcome::BadgeIncremented {
            sender: alice.clone(),
            count: 1
        })
    );

    // Bob replies; both of Alice's tabs append it.
    let reply = send_message(&server.base_url, &bob_token, &alice, "hi alice").await;
    for (tab, read) in [(&mut tab1, &mut tab1_r), (&mut tab2, &mut tab2_r)] {
        assert_eq!(
            tab.dispatch_frame(&next_frame(read).await).unwrap(),
            Some(Outcome::Appended)
        );
    }
    next_frame(&mut bob_r).await;

    let ids = |s: &ClientSession| s.state().messages().iter().map(|m| m.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&tab1), vec![sent.id.clone(), reply.id.clone()]);
    assert_eq!(ids(&tab1), ids(&tab2));
}
