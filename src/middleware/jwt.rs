use axum::{
    extract::{FromRef, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{
    auth::{AuthUser, JwtKeys},
    error::ApiError,
    state::AppState,
};

fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Guard for the protected route group. Rejects with 401 before the handler
/// runs unless the request carries a valid bearer token.
pub async fn require_jwt(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?;

    let claims = JwtKeys::from_ref(&state).verify(token).map_err(|err| {
        debug!(error = %err, "rejected bearer token");
        ApiError::Unauthorized
    })?;

    request.extensions_mut().insert(AuthUser(claims.sub));
    Ok(next.run(request).await)
}
