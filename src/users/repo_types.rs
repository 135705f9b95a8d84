use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, absent for phone-only accounts
    pub avatar: Option<String>,
    pub sex: i16,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub sex: Option<i16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct UserStats {
    pub follow_count: i64,
    pub follower_count: i64,
}

/// A user seen through a follow edge. `edge_id` is the paging cursor.
#[derive(Debug, Clone, FromRow)]
pub struct FollowRow {
    pub edge_id: i64,
    #[sqlx(flatten)]
    pub user: User,
}

/// Keyset page over follow edges, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Only edges with an id strictly below this one.
    pub before: Option<i64>,
    pub limit: i64,
}
