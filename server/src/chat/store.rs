//! Durable message store.
//!
//! The trait is the contract the core consumes; [`SqliteMessageStore`] is the
//! production implementation over the shared rusqlite connection. All methods
//! are blocking and must run inside `spawn_blocking`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::chat::model::{Message, NewMessage, UserId};
use crate::db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("user {0} not found")]
    UnknownUser(UserId),
}

pub trait MessageStore: Send + Sync {
    /// Persist a new, unread message and return it with its id and timestamp.
    fn create(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Mark every unread message from `sender` to `receiver` as read.
    /// Returns how many rows changed; safe to retry.
    fn mark_read(&self, receiver: &str, sender: &str) -> Result<usize, StoreError>;

    /// Unread counts for `receiver`, keyed by sender. Senders with no unread
    /// messages are absent.
    fn unread_aggregate(&self, receiver: &str) -> Result<BTreeMap<UserId, u64>, StoreError>;

    fn unread_count(&self, receiver: &str, sender: &str) -> Result<u64, StoreError> {
        Ok(self
            .unread_aggregate(receiver)?
            .get(sender)
            .copied()
            .unwrap_or(0))
    }

    /// Both directions of the conversation between `a` and `b`, oldest first.
    fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError>;
}

pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, created_at, is_read";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let created_millis: i64 = row.get(5)?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, created_millis))?;
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        created_at,
        is_read: row.get::<_, i64>(6)? != 0,
    })
}

impl MessageStore for SqliteMessageStore {
    fn create(&self, new: NewMessage) -> Result<Message, StoreError> {
        let conn = self.conn()?;

        for user in [&new.sender_id, &new.receiver_id] {
            let exists = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", rusqlite::params![user], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::UnknownUser(user.clone()));
            }
        }

        let id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();
        let created_millis = now.timestamp_millis();

        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            rusqlite::params![
                id,
                new.sender_id,
                new.receiver_id,
                new.text,
                new.image,
                created_millis,
            ],
        )?;

        Ok(Message {
            id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            text: new.text,
            image: new.image,
            // Stored at millisecond precision; return what a re-read would.
            created_at: DateTime::<Utc>::from_timestamp_millis(created_millis).unwrap_or(now),
            is_read: false,
        })
    }

    fn mark_read(&self, receiver: &str, sender: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        // Single statement, so the flip is atomic as a set.
        let updated = conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
            rusqlite::params![receiver, sender],
        )?;
        Ok(updated)
    }

    fn unread_aggregate(&self, receiver: &str) -> Result<BTreeMap<UserId, u64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND is_read = 0
             GROUP BY sender_id",
        )?;
        let rows = stmt.query_map(rusqlite::params![receiver], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (sender, count) = row?;
            counts.insert(sender, count.max(0) as u64);
        }
        Ok(counts)
    }

    fn unread_count(&self, receiver: &str, sender: &str) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
            rusqlite::params![receiver, sender],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(rusqlite::params![a, b], message_from_row)?;

        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }
}
