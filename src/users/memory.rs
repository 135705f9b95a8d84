use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::repo::{UniqueViolation, UserRepo};
use super::repo_types::{Cursor, FollowRow, NewUser, User, UserChanges, UserStats};

#[derive(Debug, Clone, Copy)]
struct Edge {
    id: i64,
    follower_id: i64,
    followed_id: i64,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    edges: Vec<Edge>,
    next_user_id: i64,
    next_edge_id: i64,
}

/// Process-local user store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryUserRepo {
    inner: RwLock<Inner>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page(
    inner: &Inner,
    cursor: Cursor,
    matches: impl Fn(&Edge) -> Option<i64>,
) -> Vec<FollowRow> {
    // Edges are appended with increasing ids, so reverse order is newest first.
    inner
        .edges
        .iter()
        .rev()
        .filter(|e| cursor.before.map_or(true, |before| e.id < before))
        .filter_map(|e| {
            let other = matches(e)?;
            inner.users.get(&other).map(|user| FollowRow {
                edge_id: e.id,
                user: user.clone(),
            })
        })
        .take(cursor.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut inner = self.inner.write().await;
        for user in inner.users.values() {
            let field = if new.email.is_some() && user.email == new.email {
                "email"
            } else if user.username == new.username {
                "username"
            } else if new.phone.is_some() && user.phone == new.phone {
                "phone"
            } else {
                continue;
            };
            return Err(UniqueViolation { field }.into());
        }

        inner.next_user_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.next_user_id,
            username: new.username,
            email: new.email,
            phone: new.phone,
            password_hash: new.password_hash,
            avatar: None,
            sex: 0,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn update(&self, id: i64, changes: UserChanges) -> anyhow::Result<Option<User>> {
        let mut inner = self.inner.write().await;
        if let Some(username) = &changes.username {
            let taken = inner
                .users
                .values()
                .any(|u| u.id != id && &u.username == username);
            if taken {
                return Err(UniqueViolation { field: "username" }.into());
            }
        }
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(avatar) = changes.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(sex) = changes.sex {
            user.sex = sex;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn stats(&self, id: i64) -> anyhow::Result<UserStats> {
        let inner = self.inner.read().await;
        let follow_count = inner.edges.iter().filter(|e| e.follower_id == id).count() as i64;
        let follower_count = inner.edges.iter().filter(|e| e.followed_id == id).count() as i64;
        Ok(UserStats {
            follow_count,
            follower_count,
        })
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges
            .iter()
            .any(|e| e.follower_id == follower_id && e.followed_id == followed_id))
    }

    async fn follow(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<()> {
        anyhow::ensure!(follower_id != followed_id, "self follow");
        let mut inner = self.inner.write().await;
        let exists = inner
            .edges
            .iter()
            .any(|e| e.follower_id == follower_id && e.followed_id == followed_id);
        if !exists {
            inner.next_edge_id += 1;
            let id = inner.next_edge_id;
            inner.edges.push(Edge {
                id,
                follower_id,
                followed_id,
            });
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .edges
            .retain(|e| !(e.follower_id == follower_id && e.followed_id == followed_id));
        Ok(())
    }

    async fn following(&self, user_id: i64, cursor: Cursor) -> anyhow::Result<Vec<FollowRow>> {
        let inner = self.inner.read().await;
        Ok(page(&inner, cursor, |e| {
            (e.follower_id == user_id).then_some(e.followed_id)
        }))
    }

    async fn followers(&self, user_id: i64, cursor: Cursor) -> anyhow::Result<Vec<FollowRow>> {
        let inner = self.inner.read().await;
        Ok(page(&inner, cursor, |e| {
            (e.followed_id == user_id).then_some(e.follower_id)
        }))
    }
}
