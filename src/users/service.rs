use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use tracing::{info, warn};

use super::dto::{
    AuthResponse, FollowListResponse, FollowRequest, FollowResponse, FollowUser, LoginRequest,
    Pagination, PhoneLoginRequest, RegisterRequest, UpdateUserRequest, UserInfo, VCodeResponse,
};
use super::repo::{UniqueViolation, UserRepo};
use super::repo_types::{Cursor, FollowRow, NewUser, User, UserChanges};
use super::vcode::VerificationCodes;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::JwtKeys;
use crate::error::ApiError;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_AVATAR_LEN: usize = 512;
/// Suffixed usernames tried after `user_<digits>` is taken.
const PHONE_USERNAME_RETRIES: usize = 8;

/// Everything the HTTP handlers need from the user domain.
#[async_trait]
pub trait UserService: Send + Sync {
    async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, ApiError>;
    async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ApiError>;
    async fn phone_login(&self, req: PhoneLoginRequest) -> Result<AuthResponse, ApiError>;
    async fn issue_vcode(&self, phone: &str) -> Result<VCodeResponse, ApiError>;
    async fn get_user(&self, id: i64) -> Result<UserInfo, ApiError>;
    async fn update_user(
        &self,
        actor: i64,
        id: i64,
        req: UpdateUserRequest,
    ) -> Result<UserInfo, ApiError>;
    async fn follow(&self, actor: i64, req: FollowRequest) -> Result<FollowResponse, ApiError>;
    async fn following(
        &self,
        user_id: i64,
        page: Pagination,
    ) -> Result<FollowListResponse, ApiError>;
    async fn followers(
        &self,
        user_id: i64,
        page: Pagination,
    ) -> Result<FollowListResponse, ApiError>;
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{6,15}$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

fn page_cursor(page: Pagination) -> Cursor {
    Cursor {
        before: page.last_id,
        limit: page
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
    }
}

/// Canonical form of a phone number: digits only, so `+86138...` and
/// `86138...` name the same account and the same pending code.
pub(crate) fn normalize_phone(phone: &str) -> Result<String, ApiError> {
    let phone = phone.trim();
    if !is_valid_phone(phone) {
        return Err(ApiError::Validation("invalid phone number".into()));
    }
    Ok(phone.trim_start_matches('+').to_string())
}

/// Unique-constraint failures that slipped past the pre-checks become 409.
fn write_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<UniqueViolation>() {
        Some(violation) => ApiError::Conflict(violation.field),
        None => ApiError::Internal(err),
    }
}

/// Production `UserService` on top of a `UserRepo`.
pub struct AccountService {
    repo: Arc<dyn UserRepo>,
    codes: VerificationCodes,
    keys: JwtKeys,
    expose_codes: bool,
}

impl AccountService {
    pub fn new(
        repo: Arc<dyn UserRepo>,
        codes: VerificationCodes,
        keys: JwtKeys,
        expose_codes: bool,
    ) -> Self {
        Self {
            repo,
            codes,
            keys,
            expose_codes,
        }
    }

    fn issue_token(&self, user: User) -> Result<AuthResponse, ApiError> {
        let token = self.keys.sign(user.id)?;
        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    async fn existing_user(&self, id: i64) -> Result<User, ApiError> {
        self.repo.find_by_id(id).await?.ok_or(ApiError::UserNotFound)
    }

    async fn user_info(&self, user: User) -> Result<UserInfo, ApiError> {
        let stats = self.repo.stats(user.id).await?;
        Ok(UserInfo::new(user, stats))
    }

    /// First phone login: create the account, named `user_<digits>` or a
    /// suffixed variant when that name is already taken.
    async fn register_phone(&self, phone: &str) -> Result<User, ApiError> {
        let base = format!("user_{phone}");
        let mut username = base.clone();
        for _ in 0..=PHONE_USERNAME_RETRIES {
            let created = self
                .repo
                .create(NewUser {
                    username: username.clone(),
                    phone: Some(phone.to_string()),
                    ..NewUser::default()
                })
                .await;
            match created {
                Ok(user) => {
                    info!(user_id = user.id, username = %user.username, "user registered by phone");
                    return Ok(user);
                }
                Err(err) => match err.downcast_ref::<UniqueViolation>().map(|v| v.field) {
                    Some("username") => {
                        let suffix = rand::thread_rng().gen_range(0..10_000u32);
                        username = format!("{base}_{suffix:04}");
                    }
                    // A concurrent login for the same number created it first.
                    Some("phone") => {
                        return self
                            .repo
                            .find_by_phone(phone)
                            .await?
                            .ok_or_else(|| ApiError::Internal(err));
                    }
                    _ => return Err(write_error(err)),
                },
            }
        }
        warn!(phone, "no free username for phone account");
        Err(ApiError::Conflict("username"))
    }

    fn list_page(mut rows: Vec<FollowRow>, cursor: Cursor) -> FollowListResponse {
        let has_more = rows.len() as i64 > cursor.limit;
        rows.truncate(cursor.limit as usize);
        let last_id = rows.last().map(|r| r.edge_id);
        FollowListResponse {
            users: rows.into_iter().map(FollowUser::from).collect(),
            has_more,
            last_id,
        }
    }
}

#[async_trait]
impl UserService for AccountService {
    async fn register(&self, mut req: RegisterRequest) -> Result<AuthResponse, ApiError> {
        req.email = req.email.trim().to_lowercase();
        req.username = req.username.trim().to_string();

        if !is_valid_email(&req.email) {
            warn!(email = %req.email, "invalid email");
            return Err(ApiError::Validation("invalid email".into()));
        }
        if !is_valid_username(&req.username) {
            return Err(ApiError::Validation(
                "username must be 3-32 letters, digits or underscores".into(),
            ));
        }
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&req.password.len()) {
            return Err(ApiError::Validation(format!(
                "password must be {MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN} characters"
            )));
        }

        if self.repo.find_by_email(&req.email).await?.is_some() {
            warn!(email = %req.email, "email already registered");
            return Err(ApiError::Conflict("email"));
        }
        if self.repo.find_by_username(&req.username).await?.is_some() {
            return Err(ApiError::Conflict("username"));
        }

        let hash = hash_password(&req.password)?;
        let user = self
            .repo
            .create(NewUser {
                username: req.username,
                email: Some(req.email),
                phone: None,
                password_hash: Some(hash),
            })
            .await
            .map_err(write_error)?;

        info!(user_id = user.id, username = %user.username, "user registered");
        self.issue_token(user)
    }

    async fn login(&self, mut req: LoginRequest) -> Result<AuthResponse, ApiError> {
        req.email = req.email.trim().to_lowercase();
        if !is_valid_email(&req.email) {
            return Err(ApiError::Validation("invalid email".into()));
        }

        let Some(user) = self.repo.find_by_email(&req.email).await? else {
            warn!(email = %req.email, "login unknown email");
            return Err(ApiError::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            warn!(user_id = user.id, "login on account without password");
            return Err(ApiError::InvalidCredentials);
        };
        if !verify_password(&req.password, hash)? {
            warn!(user_id = user.id, "login invalid password");
            return Err(ApiError::InvalidCredentials);
        }

        info!(user_id = user.id, "user logged in");
        self.issue_token(user)
    }

    async fn phone_login(&self, req: PhoneLoginRequest) -> Result<AuthResponse, ApiError> {
        let phone = normalize_phone(&req.phone)?;
        if !self.codes.verify(&phone, req.code.trim()) {
            warn!(phone, "verification code rejected");
            return Err(ApiError::InvalidVerificationCode);
        }

        let user = match self.repo.find_by_phone(&phone).await? {
            Some(user) => user,
            None => self.register_phone(&phone).await?,
        };

        info!(user_id = user.id, "user logged in by phone");
        self.issue_token(user)
    }

    async fn issue_vcode(&self, phone: &str) -> Result<VCodeResponse, ApiError> {
        let phone = normalize_phone(phone)?;
        let code = self.codes.issue(&phone);
        // No SMS gateway: the log line is the delivery channel outside development.
        info!(phone, code = %code, "verification code generated");
        Ok(VCodeResponse {
            phone,
            expires_in: self.codes.ttl().whole_seconds(),
            code: self.expose_codes.then_some(code),
        })
    }

    async fn get_user(&self, id: i64) -> Result<UserInfo, ApiError> {
        let user = self.existing_user(id).await?;
        self.user_info(user).await
    }

    async fn update_user(
        &self,
        actor: i64,
        id: i64,
        req: UpdateUserRequest,
    ) -> Result<UserInfo, ApiError> {
        if actor != id {
            warn!(actor, id, "update of foreign profile");
            return Err(ApiError::Forbidden);
        }

        let username = req.username.map(|u| u.trim().to_string());
        if let Some(username) = &username {
            if !is_valid_username(username) {
                return Err(ApiError::Validation(
                    "username must be 3-32 letters, digits or underscores".into(),
                ));
            }
            if let Some(other) = self.repo.find_by_username(username).await? {
                if other.id != id {
                    return Err(ApiError::Conflict("username"));
                }
            }
        }
        if req.avatar.as_ref().is_some_and(|a| a.len() > MAX_AVATAR_LEN) {
            return Err(ApiError::Validation("avatar is too long".into()));
        }
        if req.sex.is_some_and(|s| !(0..=2).contains(&s)) {
            return Err(ApiError::Validation("sex must be 0, 1 or 2".into()));
        }

        let changes = UserChanges {
            username,
            avatar: req.avatar,
            sex: req.sex,
        };
        let user = self
            .repo
            .update(id, changes)
            .await
            .map_err(write_error)?
            .ok_or(ApiError::UserNotFound)?;

        info!(user_id = id, "profile updated");
        self.user_info(user).await
    }

    async fn follow(&self, actor: i64, req: FollowRequest) -> Result<FollowResponse, ApiError> {
        let target = req.user_id;
        if actor == target {
            return Err(ApiError::CannotFollowSelf);
        }
        self.existing_user(target).await?;

        let following = if self.repo.is_following(actor, target).await? {
            self.repo.unfollow(actor, target).await?;
            info!(follower = actor, followed = target, "unfollowed");
            false
        } else {
            self.repo.follow(actor, target).await?;
            info!(follower = actor, followed = target, "followed");
            true
        };

        Ok(FollowResponse {
            user_id: target,
            following,
        })
    }

    async fn following(
        &self,
        user_id: i64,
        page: Pagination,
    ) -> Result<FollowListResponse, ApiError> {
        self.existing_user(user_id).await?;
        let cursor = page_cursor(page);
        let probe = Cursor {
            limit: cursor.limit + 1,
            ..cursor
        };
        let rows = self.repo.following(user_id, probe).await?;
        Ok(Self::list_page(rows, cursor))
    }

    async fn followers(
        &self,
        user_id: i64,
        page: Pagination,
    ) -> Result<FollowListResponse, ApiError> {
        self.existing_user(user_id).await?;
        let cursor = page_cursor(page);
        let probe = Cursor {
            limit: cursor.limit + 1,
            ..cursor
        };
        let rows = self.repo.followers(user_id, probe).await?;
        Ok(Self::list_page(rows, cursor))
    }
}
