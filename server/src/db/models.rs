/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use serde::Serialize;

/// User record in the users table.
/// `password_hash` never leaves the server; use [`PublicUser`] in responses.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// User as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            profile_pic: user.profile_pic,
            created_at: user.created_at,
        }
    }
}

/// Column list matching [`User::from_row`].
pub const USER_COLUMNS: &str =
    "id, email, full_name, password_hash, profile_pic, created_at, updated_at";

impl User {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            password_hash: row.get(3)?,
            profile_pic: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}
