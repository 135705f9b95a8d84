use std::net::SocketAddr;

use axum::{
    extract::MatchedPath,
    handler::HandlerWithoutStateExt,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{self, metrics::track};
use crate::openapi::ApiDoc;
use crate::ops;
use crate::state::AppState;
use crate::users::handlers as user;

/// Routes anyone may call.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(ops::health))
        .route("/metrics", get(ops::metrics))
        .route("/v1/register", post(user::register))
        .route("/v1/login", post(user::login))
        .route("/v1/login/phone", post(user::phone_login))
        .route("/v1/vcode", get(user::vcode))
        .route("/v1/users/{id}", get(user::get))
}

/// Routes behind the JWT guard.
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/users/{id}", put(user::update))
        .route("/v1/users/follow", post(user::follow))
        .route("/v1/users/{id}/following", get(user::follow_list))
        .route("/v1/users/{id}/followers", get(user::follower_list))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_jwt))
}

pub fn build_app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(ops::route_not_found.into_service());

    Router::new()
        .merge(public_routes())
        .merge(protected_routes(&state))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/static", static_files)
        .fallback(ops::route_not_found)
        .method_not_allowed_fallback(ops::route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(middleware::no_cache))
                .layer(from_fn(middleware::options))
                .layer(from_fn(middleware::secure))
                .layer(from_fn(middleware::access_log))
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(from_fn_with_state(state.metrics.clone(), track))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &Request<_>| {
                            let method = req.method().clone();
                            let uri = req.uri().clone();
                            let route = req
                                .extensions()
                                .get::<MatchedPath>()
                                .map(|p| p.as_str().to_owned())
                                .unwrap_or_default();
                            let request_id = req
                                .extensions()
                                .get::<RequestId>()
                                .and_then(|id| id.header_value().to_str().ok())
                                .unwrap_or_default()
                                .to_owned();
                            tracing::info_span!(
                                "http_request",
                                %method,
                                uri = %uri,
                                route = %route,
                                request_id = %request_id,
                                status = tracing::field::Empty,
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                let status = res.status();
                                span.record("status", tracing::field::display(status));
                                tracing::debug!(%status, latency_ms = latency.as_millis() as u64, "response");
                            },
                        ),
                )
                .layer(from_fn(middleware::translations)),
        )
        .with_state(state)
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
