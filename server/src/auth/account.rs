//! Email/password accounts: register, login, session check and profile edits.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt;
use crate::auth::middleware::Claims;
use crate::db::models::{PublicUser, User, USER_COLUMNS};
use crate::db::DbPool;
use crate::media::MediaError;
use crate::state::AppState;

const MIN_PASSWORD_LENGTH: usize = 6;

type ApiError = (StatusCode, String);

fn internal(context: &str, err: impl std::fmt::Display) -> ApiError {
    tracing::error!("{}: {}", context, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_string(),
    )
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, message.to_string())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    /// Base64 or `data:image/...;base64,` payload.
    pub profile_pic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn find_user(db: &DbPool, column: &str, value: &str) -> Result<Option<User>, ApiError> {
    let conn = db
        .lock()
        .map_err(|e| internal("DB lock poisoned", e))?;
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
        rusqlite::params![value],
        User::from_row,
    )
    .optional()
    .map_err(|e| internal("Failed to load user", e))
}

fn issue_session(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let token = jwt::issue_access_token(&state.jwt_secret, &user.id, state.token_ttl_secs)
        .map_err(|e| internal("Failed to issue token", e))?;
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&req.email);
    let full_name = req.full_name.trim().to_string();
    if email.is_empty() || full_name.is_empty() || req.password.is_empty() {
        return Err(bad_request("All fields are required"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(bad_request("Password must be at least 6 characters long"));
    }

    let db = state.db.clone();
    let cost = state.bcrypt_cost;

    let user = tokio::task::spawn_blocking(move || {
        if find_user(&db, "email", &email)?.is_some() {
            return Err(bad_request("User already exists"));
        }

        let password_hash =
            bcrypt::hash(&req.password, cost).map_err(|e| internal("Failed to hash password", e))?;
        let now = Utc::now().to_rfc3339();
        let user = User {
            id: Uuid::now_v7().to_string(),
            email,
            full_name,
            password_hash,
            profile_pic: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = db.lock().map_err(|e| internal("DB lock poisoned", e))?;
        conn.execute(
            "INSERT INTO users (id, email, full_name, password_hash, profile_pic, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
            rusqlite::params![
                user.id,
                user.email,
                user.full_name,
                user.password_hash,
                user.created_at,
                user.updated_at,
            ],
        )
        .map_err(|e| match e {
            // Lost a race with a concurrent registration of the same email.
            rusqlite::Error::SqliteFailure(ref f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bad_request("User already exists")
            }
            e => internal("Failed to insert user", e),
        })?;

        Ok(user)
    })
    .await
    .map_err(|e| internal("Register task failed", e))??;

    tracing::info!(user_id = %user.id, "User registered");

    let response = issue_session(&state, user)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let db = state.db.clone();
    let email = normalize_email(&req.email);

    let user = tokio::task::spawn_blocking(move || {
        let user = find_user(&db, "email", &email)?.ok_or_else(|| bad_request("Invalid Credentials"))?;
        // A corrupt stored hash reads as a failed login, not a 500.
        let valid = bcrypt::verify(&req.password, &user.password_hash).unwrap_or(false);
        if !valid {
            return Err(bad_request("Invalid Credentials"));
        }
        Ok(user)
    })
    .await
    .map_err(|e| internal("Login task failed", e))??;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(issue_session(&state, user)?))
}

/// POST /api/auth/logout
/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> Json<LogoutResponse> {
    Json(LogoutResponse {
        message: "User Logged Out Successfully".to_string(),
    })
}

/// GET /api/auth/check -- The user behind the bearer token.
pub async fn check(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<PublicUser>, ApiError> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || find_user(&db, "id", &claims.sub))
        .await
        .map_err(|e| internal("Check task failed", e))??
        .ok_or((StatusCode::UNAUTHORIZED, "Unauthorized: user not found".to_string()))?;

    Ok(Json(user.into()))
}

/// PUT /api/auth/profile -- Update display name and/or profile picture.
pub async fn update_profile(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let full_name = req
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let encoded_pic = req.profile_pic.filter(|p| !p.trim().is_empty());

    let db = state.db.clone();
    let images = state.images.clone();
    let user_id = claims.sub;

    let user = tokio::task::spawn_blocking(move || {
        let profile_pic = match encoded_pic {
            Some(encoded) => Some(images.put(&encoded).map_err(|e| match e {
                MediaError::TooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
                }
                MediaError::Io(_) => internal("Failed to store profile picture", e),
                _ => bad_request(&e.to_string()),
            })?),
            None => None,
        };

        {
            let conn = db.lock().map_err(|e| internal("DB lock poisoned", e))?;
            conn.execute(
                "UPDATE users SET
                    full_name = COALESCE(?2, full_name),
                    profile_pic = COALESCE(?3, profile_pic),
                    updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![user_id, full_name, profile_pic, Utc::now().to_rfc3339()],
            )
            .map_err(|e| internal("Failed to update profile", e))?;
        }

        find_user(&db, "id", &user_id)?
            .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))
    })
    .await
    .map_err(|e| internal("Profile task failed", e))??;

    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(Json(user.into()))
}
