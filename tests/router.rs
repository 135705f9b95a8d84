mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use common::{authed_get, authed_json_request, bearer, body_bytes, body_json, get, json_request, send};
use time::OffsetDateTime;
use userhub::{
    app::build_app,
    config::AppConfig,
    error::ApiError,
    state::AppState,
    users::{
        dto::{
            AuthResponse, FollowListResponse, FollowRequest, FollowResponse, LoginRequest,
            Pagination, PhoneLoginRequest, PublicUser, RegisterRequest, UpdateUserRequest,
            UserInfo, VCodeResponse,
        },
        UserService,
    },
};

/// Records which operations the router dispatched to, and with which caller.
#[derive(Default)]
struct RecordingUsers {
    calls: Mutex<Vec<(&'static str, Option<i64>)>>,
}

impl RecordingUsers {
    fn record(&self, op: &'static str, actor: Option<i64>) {
        self.calls.lock().unwrap().push((op, actor));
    }

    fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(name, _)| *name == op).count()
    }

    fn actors(&self, op: &str) -> Vec<Option<i64>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == op)
            .map(|(_, actor)| *actor)
            .collect()
    }

    fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn auth_response(id: i64) -> AuthResponse {
    AuthResponse {
        token: "stub-token".into(),
        user: PublicUser {
            id,
            username: "stub".into(),
            email: None,
            phone: None,
        },
    }
}

fn user_info(id: i64) -> UserInfo {
    UserInfo {
        id,
        username: "stub".into(),
        avatar: None,
        sex: 0,
        follow_count: 0,
        follower_count: 0,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn empty_list() -> FollowListResponse {
    FollowListResponse {
        users: Vec::new(),
        has_more: false,
        last_id: None,
    }
}

#[async_trait]
impl UserService for RecordingUsers {
    async fn register(&self, _req: RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.record("register", None);
        Ok(auth_response(1))
    }

    async fn login(&self, _req: LoginRequest) -> Result<AuthResponse, ApiError> {
        self.record("login", None);
        Ok(auth_response(1))
    }

    async fn phone_login(&self, _req: PhoneLoginRequest) -> Result<AuthResponse, ApiError> {
        self.record("phone_login", None);
        Ok(auth_response(2))
    }

    async fn issue_vcode(&self, phone: &str) -> Result<VCodeResponse, ApiError> {
        self.record("issue_vcode", None);
        Ok(VCodeResponse {
            phone: phone.to_string(),
            expires_in: 300,
            code: None,
        })
    }

    async fn get_user(&self, id: i64) -> Result<UserInfo, ApiError> {
        self.record("get_user", None);
        Ok(user_info(id))
    }

    async fn update_user(
        &self,
        actor: i64,
        id: i64,
        _req: UpdateUserRequest,
    ) -> Result<UserInfo, ApiError> {
        self.record("update_user", Some(actor));
        Ok(user_info(id))
    }

    async fn follow(&self, actor: i64, req: FollowRequest) -> Result<FollowResponse, ApiError> {
        self.record("follow", Some(actor));
        Ok(FollowResponse {
            user_id: req.user_id,
            following: true,
        })
    }

    async fn following(&self, _user_id: i64, _page: Pagination) -> Result<FollowListResponse, ApiError> {
        self.record("following", None);
        Ok(empty_list())
    }

    async fn followers(&self, _user_id: i64, _page: Pagination) -> Result<FollowListResponse, ApiError> {
        self.record("followers", None);
        Ok(empty_list())
    }
}

fn setup_with_config(config: AppConfig) -> (Router, Arc<RecordingUsers>) {
    let users = Arc::new(RecordingUsers::default());
    let state = AppState::from_parts(Arc::new(config), users.clone()).unwrap();
    (build_app(state), users)
}

fn setup() -> (Router, Arc<RecordingUsers>) {
    setup_with_config(AppState::test_config())
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn unknown_path_and_unknown_method_share_not_found() {
    let (app, users) = setup();

    let unknown_path = send(&app, get("/definitely/not/here")).await;
    assert_eq!(unknown_path.status(), StatusCode::NOT_FOUND);
    let unknown_path = body_bytes(unknown_path).await;

    for (method, uri) in [
        (Method::DELETE, "/health"),
        (Method::GET, "/v1/register"),
        (Method::PATCH, "/v1/users/1"),
        (Method::DELETE, "/v1/users/1/following"),
    ] {
        let response = send(&app, request(method.clone(), uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(body_bytes(response).await, unknown_path, "{method} {uri}");
    }

    let json: serde_json::Value = serde_json::from_slice(&unknown_path).unwrap();
    assert_eq!(json["error"], "route_not_found");
    assert_eq!(users.total(), 0);
}

#[tokio::test]
async fn update_without_token_never_reaches_handler() {
    let (app, users) = setup();
    let body = serde_json::json!({ "username": "renamed" });

    let response = send(&app, json_request("PUT", "/v1/users/123", body.clone())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");

    let response = send(
        &app,
        authed_json_request("PUT", "/v1/users/123", "Bearer not.a.token", body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(users.count("update_user"), 0);
}

#[tokio::test]
async fn update_with_token_reaches_handler_as_caller() {
    let (app, users) = setup();
    let body = serde_json::json!({ "username": "renamed" });

    let response = send(
        &app,
        authed_json_request("PUT", "/v1/users/123", &bearer(123), body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(users.actors("update_user"), vec![Some(123)]);
}

#[tokio::test]
async fn token_from_another_issuer_is_rejected() {
    let (app, users) = setup();
    let mut config = AppState::test_config();
    config.jwt.issuer = "someone-else".into();
    let foreign = userhub::auth::JwtKeys::from_config(&config.jwt).sign(123).unwrap();

    let response = send(
        &app,
        authed_get("/v1/users/123/followers", &format!("Bearer {foreign}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(users.count("followers"), 0);
}

#[tokio::test]
async fn public_profile_needs_no_token() {
    let (app, users) = setup();
    let response = send(&app, get("/v1/users/7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], 7);
    assert_eq!(users.count("get_user"), 1);
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = setup();
    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn metrics_are_scrapeable_without_auth() {
    let (app, _) = setup();

    let first = send(&app, get("/metrics")).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = String::from_utf8(body_bytes(first).await).unwrap();
    assert!(first.contains("userhub_"));

    send(&app, get("/health")).await;
    let response = send(&app, get("/metrics")).await;
    let content_type = response.headers()["content-type"].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/plain"));
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("userhub_http_requests_total"));
    assert!(text.contains("path=\"/health\""));
}

#[tokio::test]
async fn register_and_phone_login_dispatch_once() {
    let (app, users) = setup();

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/register",
            serde_json::json!({ "username": "alice", "email": "a@example.com", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/login/phone",
            serde_json::json!({ "phone": "13800000000", "code": "123456" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(users.count("register"), 1);
    assert_eq!(users.count("phone_login"), 1);
    assert_eq!(users.count("login"), 0);
}

#[tokio::test]
async fn vcode_and_password_login_are_public() {
    let (app, users) = setup();

    let response = send(&app, get("/v1/vcode?phone=13800000000")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/login",
            serde_json::json!({ "email": "a@example.com", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(users.count("issue_vcode"), 1);
    assert_eq!(users.count("login"), 1);
}

#[tokio::test]
async fn follow_routes_require_token() {
    let (app, users) = setup();

    let response = send(&app, get("/v1/users/1/following")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(users.count("following"), 0);

    let response = send(&app, authed_get("/v1/users/1/following", &bearer(5))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(users.count("following"), 1);

    let response = send(&app, authed_get("/v1/users/1/followers", &bearer(5))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(users.count("followers"), 1);

    let follow = serde_json::json!({ "user_id": 9 });
    let response = send(&app, json_request("POST", "/v1/users/follow", follow.clone())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send(
        &app,
        authed_json_request("POST", "/v1/users/follow", &bearer(5), follow),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(users.actors("follow"), vec![Some(5)]);
}

#[tokio::test]
async fn lowercase_bearer_scheme_is_accepted() {
    let (app, users) = setup();
    let token = bearer(5).replacen("Bearer", "bearer", 1);
    let response = send(&app, authed_get("/v1/users/1/followers", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(users.count("followers"), 1);
}

#[tokio::test]
async fn options_short_circuits_before_routing() {
    let (app, users) = setup();

    for uri in ["/v1/register", "/v1/users/1", "/no/such/route"] {
        let response = send(&app, request(Method::OPTIONS, uri)).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(
            headers["access-control-allow-methods"],
            "GET,POST,PUT,PATCH,DELETE,OPTIONS"
        );
        assert_eq!(
            headers["access-control-allow-headers"],
            "authorization, origin, content-type, accept"
        );
        assert_eq!(headers["allow"], "HEAD,GET,POST,PUT,PATCH,DELETE,OPTIONS");
    }
    assert_eq!(users.total(), 0);
}

#[tokio::test]
async fn every_response_carries_cache_and_security_headers() {
    let (app, _) = setup();

    for uri in ["/health", "/missing"] {
        let response = send(&app, get(uri)).await;
        let headers = response.headers();
        assert_eq!(
            headers["cache-control"],
            "no-cache, no-store, max-age=0, must-revalidate, value"
        );
        assert_eq!(headers["expires"], "Thu, 01 Jan 1970 00:00:00 GMT");
        assert!(headers.contains_key("last-modified"));
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert!(!headers.contains_key("strict-transport-security"));
    }

    let response = send(
        &app,
        Request::get("/health")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(
        response.headers()["strict-transport-security"],
        "max-age=31536000"
    );
}

#[tokio::test]
async fn request_id_is_generated_or_propagated() {
    let (app, _) = setup();

    let response = send(&app, get("/health")).await;
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(!generated.is_empty());

    let response = send(
        &app,
        Request::get("/health")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn errors_are_localized_from_accept_language() {
    let (app, _) = setup();

    let response = send(
        &app,
        Request::get("/missing")
            .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-language"], "zh");
    let json = body_json(response).await;
    assert_eq!(json["error"], "route_not_found");
    assert_eq!(json["message"], "接口不存在");

    let response = send(&app, get("/missing")).await;
    assert_eq!(response.headers()["content-language"], "en");
    assert_eq!(body_json(response).await["message"], "route not found");
}

#[tokio::test]
async fn static_files_are_served_from_configured_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("logo.txt"), "userhub").unwrap();
    let mut config = AppState::test_config();
    config.static_dir = dir.path().to_path_buf();
    let (app, _) = setup_with_config(config);

    let response = send(&app, get("/static/logo.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(body_bytes(response).await, b"userhub");

    let response = send(&app, get("/static/missing.png")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "route_not_found");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (app, _) = setup();
    let response = send(&app, get("/api-docs/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/v1/users/{id}/following"].is_object());
}

#[tokio::test]
async fn unparseable_requests_get_json_validation_errors() {
    let (app, users) = setup();

    let bad_id = send(&app, get("/v1/users/abc")).await;
    let missing_field = send(
        &app,
        json_request("POST", "/v1/register", serde_json::json!({ "email": "a@example.com" })),
    )
    .await;
    let missing_query = send(&app, get("/v1/vcode")).await;
    let bad_page = send(&app, authed_get("/v1/users/1/followers?limit=many", &bearer(5))).await;

    for response in [bad_id, missing_field, missing_query, bad_page] {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        assert_eq!(body_json(response).await["error"], "validation_error");
    }
    assert_eq!(users.total(), 0);
}

#[tokio::test]
async fn extractor_errors_are_localized() {
    let (app, _) = setup();
    let response = send(
        &app,
        Request::get("/v1/users/abc")
            .header("accept-language", "zh")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = body_json(response).await["message"].as_str().unwrap().to_owned();
    assert!(message.starts_with("请求参数无效: "));
}
