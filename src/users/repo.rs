use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::repo_types::{Cursor, FollowRow, NewUser, User, UserChanges, UserStats};

/// Storage for accounts and the follow graph.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, new: NewUser) -> anyhow::Result<User>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>>;
    /// Returns `None` when the user does not exist.
    async fn update(&self, id: i64, changes: UserChanges) -> anyhow::Result<Option<User>>;
    async fn stats(&self, id: i64) -> anyhow::Result<UserStats>;
    async fn is_following(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<bool>;
    async fn follow(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<()>;
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<()>;
    /// Users that `user_id` follows.
    async fn following(&self, user_id: i64, cursor: Cursor) -> anyhow::Result<Vec<FollowRow>>;
    /// Users that follow `user_id`.
    async fn followers(&self, user_id: i64, cursor: Cursor) -> anyhow::Result<Vec<FollowRow>>;
}

/// A write rejected because `field` already belongs to another user.
/// Carried inside the `anyhow::Error` returned by `create` and `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{field} already taken")]
pub struct UniqueViolation {
    pub field: &'static str,
}

/// Column behind a unique constraint of the `users` table, judged by the
/// constraint name (`users_email_key`, `users_phone_key`, `users_username_key`).
fn constraint_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.contains("email") => "email",
        Some(name) if name.contains("phone") => "phone",
        _ => "username",
    }
}

fn write_error(err: sqlx::Error, what: &'static str) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return UniqueViolation {
                field: constraint_field(db.constraint()),
            }
            .into();
        }
    }
    anyhow::Error::new(err).context(what)
}

const USER_COLUMNS: &str =
    "id, username, email, phone, password_hash, avatar, sex, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Connect and apply the bundled migrations.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        Ok(Self::new(db))
    }

    async fn find_by(&self, column: &str, value: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("find user by {column}"))?;
        Ok(user)
    }

    async fn edges(
        &self,
        join_on: &str,
        filter_on: &str,
        user_id: i64,
        cursor: Cursor,
    ) -> anyhow::Result<Vec<FollowRow>> {
        let sql = format!(
            r#"
            SELECT f.id AS edge_id, u.id, u.username, u.email, u.phone, u.password_hash,
                   u.avatar, u.sex, u.created_at, u.updated_at
              FROM user_follows f
              JOIN users u ON u.id = f.{join_on}
             WHERE f.{filter_on} = $1
               AND ($2::BIGINT IS NULL OR f.id < $2)
             ORDER BY f.id DESC
             LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, FollowRow>(&sql)
            .bind(user_id)
            .bind(cursor.before)
            .bind(cursor.limit)
            .fetch_all(&self.db)
            .await
            .context("list follow edges")?;
        Ok(rows)
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (username, email, phone, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.phone)
            .bind(&new.password_hash)
            .fetch_one(&self.db)
            .await
            .map_err(|e| write_error(e, "insert user"))?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.find_by("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        self.find_by("username", username).await
    }

    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        self.find_by("phone", phone).await
    }

    async fn update(&self, id: i64, changes: UserChanges) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET username = COALESCE($2, username),
                   avatar = COALESCE($3, avatar),
                   sex = COALESCE($4, sex),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.avatar)
            .bind(changes.sex)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| write_error(e, "update user"))?;
        Ok(user)
    }

    async fn stats(&self, id: i64) -> anyhow::Result<UserStats> {
        let stats = sqlx::query_as::<_, UserStats>(
            r#"
            SELECT (SELECT COUNT(*) FROM user_follows WHERE follower_id = $1) AS follow_count,
                   (SELECT COUNT(*) FROM user_follows WHERE followed_id = $1) AS follower_count
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .context("user stats")?;
        Ok(stats)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM user_follows WHERE follower_id = $1 AND followed_id = $2
            )
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.db)
        .await
        .context("check follow edge")?;
        Ok(exists)
    }

    async fn follow(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_follows (follower_id, followed_id)
            VALUES ($1, $2)
            ON CONFLICT (follower_id, followed_id) DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .execute(&self.db)
        .await
        .context("insert follow edge")?;
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM user_follows WHERE follower_id = $1 AND followed_id = $2")
            .bind(follower_id)
            .bind(followed_id)
            .execute(&self.db)
            .await
            .context("delete follow edge")?;
        Ok(())
    }

    async fn following(&self, user_id: i64, cursor: Cursor) -> anyhow::Result<Vec<FollowRow>> {
        self.edges("followed_id", "follower_id", user_id, cursor).await
    }

    async fn followers(&self, user_id: i64, cursor: Cursor) -> anyhow::Result<Vec<FollowRow>> {
        self.edges("follower_id", "followed_id", user_id, cursor).await
    }
}
