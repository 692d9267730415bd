//! Integration tests for accounts, profiles and image uploads.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use chatosi_server::chat::store::SqliteMessageStore;
use chatosi_server::media::DiskImageStore;
use chatosi_server::ws::ConnectionRegistry;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

/// Helper: start the server on a random port and return its base URL.
async fn start_test_server() -> String {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = chatosi_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = chatosi_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = chatosi_server::state::AppState {
        db: db.clone(),
        jwt_secret,
        token_ttl_secs: 3600,
        bcrypt_cost: 4,
        max_body_bytes: 1024 * 1024,
        connections: Arc::new(ConnectionRegistry::new()),
        messages: Arc::new(SqliteMessageStore::new(db)),
        images: Arc::new(DiskImageStore::new(&data_dir, 64 * 1024)),
    };

    let app = chatosi_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    format!("http://{}", addr)
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

#[tokio::test]
async fn test_health_check() {
    let base_url = start_test_server().await;

    let resp = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_register_login_check_logout() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "email": "  Alice@Example.com ",
            "full_name": "Alice",
            "password": "s3cret!",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(body["user"].get("password_hash").is_none());
    let user_id = body["user"]["id"].as_str().unwrap().to_string();

    // Login is case-insensitive on email
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({ "email": "ALICE@example.com", "password": "s3cret!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let resp = client
        .get(format!("{}/api/auth/check", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let me: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(me["id"], user_id.as_str());
    assert_eq!(me["full_name"], "Alice");

    let resp = client
        .post(format!("{}/api/auth/logout", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_registration_validation() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    register_user(&base_url, "bob").await;

    let cases = [
        json!({ "email": "BOB@example.com", "full_name": "Bob 2", "password": "hunter22" }),
        json!({ "email": "carol@example.com", "full_name": "Carol", "password": "short" }),
        json!({ "email": "", "full_name": "Nobody", "password": "hunter22" }),
        json!({ "email": "dave@example.com", "full_name": "   ", "password": "hunter22" }),
    ];
    for case in cases {
        let resp = client
            .post(format!("{}/api/auth/register", base_url))
            .json(&case)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "expected rejection for {}", case);
    }
}

#[tokio::test]
async fn test_bad_credentials_and_tokens() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    register_user(&base_url, "erin").await;

    for (email, password) in [("erin@example.com", "wrong-pass"), ("nobody@example.com", "hunter22")] {
        let resp = client
            .post(format!("{}/api/auth/login", base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    let resp = client
        .get(format!("{}/api/auth/check", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/api/auth/check", base_url))
        .header("Authorization", "Bearer not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_profile_update_and_upload_serving() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&base_url, "frank").await;

    let resp = client
        .put(format!("{}/api/auth/profile", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({
            "full_name": "Frank Renamed",
            "profile_pic": format!("data:image/png;base64,{}", STANDARD.encode(PNG)),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(user["full_name"], "Frank Renamed");
    let pic = user["profile_pic"].as_str().unwrap().to_string();
    assert!(pic.starts_with("/uploads/"));

    let resp = client
        .get(format!("{}{}", base_url, pic))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), PNG);

    // Name-only update keeps the picture
    let resp = client
        .put(format!("{}/api/auth/profile", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "full_name": "Frank" }))
        .send()
        .await
        .unwrap();
    let user: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(user["profile_pic"], pic.as_str());
}

#[tokio::test]
async fn test_oversized_and_bogus_profile_pictures() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&base_url, "gina").await;

    let mut big = PNG.to_vec();
    big.resize(128 * 1024, 0);
    let resp = client
        .put(format!("{}/api/auth/profile", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "profile_pic": STANDARD.encode(&big) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    let resp = client
        .put(format!("{}/api/auth/profile", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "profile_pic": "definitely not an image" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/uploads/..%2Fjwt_secret", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_sidebar_lists_everyone_but_caller() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    let (token, me) = register_user(&base_url, "hank").await;
    let (_, ivy) = register_user(&base_url, "ivy").await;
    let (_, jay) = register_user(&base_url, "jay").await;

    let resp = client
        .get(format!("{}/api/messages/users", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let users: Vec<serde_json::Value> = resp.json().await.unwrap();
    let ids: Vec<&str> = users.iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![ivy.as_str(), jay.as_str()]);
    assert!(!ids.contains(&me.as_str()));
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
}
