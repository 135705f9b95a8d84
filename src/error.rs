use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// JSON body of every error response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error code plus the untranslated detail, stashed in the response
/// extensions so the translations middleware can re-render the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("invalid or expired verification code")]
    InvalidVerificationCode,
    #[error("cannot follow yourself")]
    CannotFollowSelf,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing or invalid token")]
    Unauthorized,
    #[error("not allowed to modify this resource")]
    Forbidden,
    #[error("user not found")]
    UserNotFound,
    #[error("route not found")]
    RouteNotFound,
    #[error("{0} already registered")]
    Conflict(&'static str),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidVerificationCode
            | ApiError::CannotFollowSelf => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::UserNotFound | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::InvalidVerificationCode => "invalid_verification_code",
            ApiError::CannotFollowSelf => "cannot_follow_self",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::UserNotFound => "user_not_found",
            ApiError::RouteNotFound => "route_not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Validation(detail) => Some(detail.clone()),
            ApiError::Conflict(field) => Some((*field).to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!(error = %err, "internal error");
        }

        let status = self.status();
        let detail = ErrorDetail {
            code: self.code(),
            detail: self.detail(),
        };
        let body = ErrorResponse {
            error: detail.code.to_string(),
            message: self.to_string(),
        };

        let mut response = (status, axum::Json(body)).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}
