use axum::{middleware, Router};

use crate::auth::account;
use crate::auth::middleware::JwtSecret;
use crate::chat::{messages, presence, unread};
use crate::media;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;

    let auth_routes = Router::new()
        .route("/api/auth/register", axum::routing::post(account::register))
        .route("/api/auth/login", axum::routing::post(account::login))
        .route("/api/auth/logout", axum::routing::post(account::logout))
        .route("/api/auth/check", axum::routing::get(account::check))
        .route("/api/auth/profile", axum::routing::put(account::update_profile));

    // Note: static segments (users, unread-count, send) take priority over {id}.
    let message_routes = Router::new()
        .route("/api/messages/users", axum::routing::get(messages::list_users))
        .route(
            "/api/messages/unread-count",
            axum::routing::get(unread::get_unread_counts),
        )
        .route(
            "/api/messages/send/{id}",
            axum::routing::post(messages::send_message),
        )
        .route("/api/messages/{id}", axum::routing::get(messages::get_conversation))
        .route(
            "/api/messages/{id}/mark-read",
            axum::routing::put(unread::mark_read),
        );

    let presence_routes =
        Router::new().route("/api/presence", axum::routing::get(presence::get_presence));

    let upload_routes =
        Router::new().route("/uploads/{name}", axum::routing::get(media::get_upload));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(message_routes)
        .merge(presence_routes)
        .merge(upload_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
