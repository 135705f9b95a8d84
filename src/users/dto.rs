use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};

use super::repo_types::{FollowRow, User, UserStats};

/// Request body for user registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for password login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for phone + verification code login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PhoneLoginRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VCodeQuery {
    /// Phone number the code is issued for.
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VCodeResponse {
    pub phone: String,
    /// Seconds until the code expires.
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Response returned after register or login.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Account data returned to its owner.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            phone: user.phone,
        }
    }
}

/// Public profile.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub sex: i16,
    pub follow_count: i64,
    pub follower_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserInfo {
    pub fn new(user: User, stats: UserStats) -> Self {
        Self {
            id: user.id,
            username: user.username,
            avatar: user.avatar,
            sex: user.sex,
            follow_count: stats.follow_count,
            follower_count: stats.follower_count,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub avatar: Option<String>,
    /// 0 unknown, 1 male, 2 female.
    pub sex: Option<i16>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FollowRequest {
    /// User to follow or unfollow.
    pub user_id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FollowResponse {
    pub user_id: i64,
    /// `true` when the caller follows `user_id` after this call.
    pub following: bool,
}

#[derive(Debug, Default, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Cursor returned as `last_id` by the previous page.
    pub last_id: Option<i64>,
    /// Page size, 1..=100 (default 20).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FollowUser {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
}

impl From<FollowRow> for FollowUser {
    fn from(row: FollowRow) -> Self {
        Self {
            id: row.user.id,
            username: row.user.username,
            avatar: row.user.avatar,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FollowListResponse {
    pub users: Vec<FollowUser>,
    pub has_more: bool,
    /// Pass back as `last_id` to fetch the next page.
    pub last_id: Option<i64>,
}
