use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "userhub API",
        description = "Accounts, login and the follow graph."
    ),
    paths(
        crate::ops::health,
        crate::ops::metrics,
        crate::users::handlers::register,
        crate::users::handlers::login,
        crate::users::handlers::phone_login,
        crate::users::handlers::vcode,
        crate::users::handlers::get,
        crate::users::handlers::update,
        crate::users::handlers::follow,
        crate::users::handlers::follow_list,
        crate::users::handlers::follower_list,
    ),
    components(schemas(
        crate::ops::HealthResponse,
        crate::error::ErrorResponse,
        crate::users::dto::RegisterRequest,
        crate::users::dto::LoginRequest,
        crate::users::dto::PhoneLoginRequest,
        crate::users::dto::VCodeResponse,
        crate::users::dto::AuthResponse,
        crate::users::dto::PublicUser,
        crate::users::dto::UserInfo,
        crate::users::dto::UpdateUserRequest,
        crate::users::dto::FollowRequest,
        crate::users::dto::FollowResponse,
        crate::users::dto::FollowUser,
        crate::users::dto::FollowListResponse,
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "users", description = "Profiles"),
        (name = "follows", description = "Follow graph"),
        (name = "system", description = "Health and metrics"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme the protected routes refer to.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Token returned by /v1/register or the login routes."))
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_api_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/metrics",
            "/v1/register",
            "/v1/login",
            "/v1/login/phone",
            "/v1/vcode",
            "/v1/users/{id}",
            "/v1/users/follow",
            "/v1/users/{id}/following",
            "/v1/users/{id}/followers",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
