use axum::{extract::State, Json};
use tracing::instrument;

use super::dto::{
    AuthResponse, FollowListResponse, FollowRequest, FollowResponse, LoginRequest, Pagination,
    PhoneLoginRequest, RegisterRequest, UpdateUserRequest, UserInfo, VCodeQuery, VCodeResponse,
};
use crate::{
    auth::AuthUser,
    error::{ApiError, ErrorResponse},
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email or username taken", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    state.users.register(payload).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    state.users.login(payload).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/v1/login/phone",
    request_body = PhoneLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Invalid phone or code", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn phone_login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PhoneLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    state.users.phone_login(payload).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/vcode",
    params(VCodeQuery),
    responses(
        (status = 200, description = "Code issued", body = VCodeResponse),
        (status = 400, description = "Invalid phone", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(state))]
pub async fn vcode(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VCodeQuery>,
) -> Result<Json<VCodeResponse>, ApiError> {
    state.users.issue_vcode(&query.phone).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = UserInfo),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    ),
    tag = "users"
)]
#[instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserInfo>, ApiError> {
    state.users.get_user(id).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserInfo),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not your profile", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserInfo>, ApiError> {
    state.users.update_user(actor, id, payload).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/v1/users/follow",
    request_body = FollowRequest,
    responses(
        (status = 200, description = "Follow state after the toggle", body = FollowResponse),
        (status = 400, description = "Cannot follow yourself", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "follows"
)]
#[instrument(skip(state))]
pub async fn follow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(payload): ApiJson<FollowRequest>,
) -> Result<Json<FollowResponse>, ApiError> {
    state.users.follow(actor, payload).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/following",
    params(("id" = i64, Path, description = "User id"), Pagination),
    responses(
        (status = 200, description = "Accounts the user follows", body = FollowListResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "follows"
)]
#[instrument(skip(state))]
pub async fn follow_list(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<FollowListResponse>, ApiError> {
    state.users.following(id, page).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/followers",
    params(("id" = i64, Path, description = "User id"), Pagination),
    responses(
        (status = 200, description = "Accounts following the user", body = FollowListResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "follows"
)]
#[instrument(skip(state))]
pub async fn follower_list(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<FollowListResponse>, ApiError> {
    state.users.followers(id, page).await.map(Json)
}
