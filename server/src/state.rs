use std::sync::Arc;

use crate::chat::store::MessageStore;
use crate::db::DbPool;
use crate::media::ImageStore;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Session token lifetime
    pub token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    /// JSON body limit; fits one base64 image at the configured size
    pub max_body_bytes: usize,
    /// Live WebSocket connections per user
    pub connections: Arc<ConnectionRegistry>,
    /// Durable message store
    pub messages: Arc<dyn MessageStore>,
    /// Message attachments and profile pictures
    pub images: Arc<dyn ImageStore>,
}
