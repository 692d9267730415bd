//! Image storage for message attachments and profile pictures.
//!
//! Images arrive as base64 (optionally wrapped in a `data:image/...;base64,`
//! URL) and are stored content-addressed under `{data_dir}/uploads`.

pub mod disk;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::state::AppState;

pub use disk::DiskImageStore;

/// URL prefix under which stored images are served.
pub const UPLOADS_PREFIX: &str = "/uploads/";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image payload is not valid base64")]
    InvalidEncoding,
    #[error("unsupported image type {0}")]
    UnsupportedType(String),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid image name")]
    InvalidName,
    #[error("image storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ImageStore: Send + Sync {
    /// Store an encoded image and return the reference clients should use.
    fn put(&self, encoded: &str) -> Result<String, MediaError>;

    /// Fetch a stored image by file name. `Ok(None)` if absent.
    fn get(&self, name: &str) -> Result<Option<(Vec<u8>, &'static str)>, MediaError>;
}

/// GET /uploads/{name} -- Serve a stored image. Public.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let images = state.images.clone();

    let found = tokio::task::spawn_blocking(move || images.get(&name))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    match found {
        Ok(Some((bytes, content_type))) => Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            bytes,
        )),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(MediaError::InvalidName) => Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            tracing::error!("Failed to read upload: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
