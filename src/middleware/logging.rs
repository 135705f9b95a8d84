use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::{ConnectInfo, Request},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};

/// One structured line per request. The request id is read off the response,
/// which already carries the propagated `x-request-id` by the time it gets here.
pub async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let query = request.uri().query().unwrap_or_default().to_owned();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    if response.status().is_server_error() {
        error!(%method, %path, %query, status, latency_ms, %client_ip, %user_agent, %request_id, "request failed");
    } else if response.status().is_client_error() {
        warn!(%method, %path, %query, status, latency_ms, %client_ip, %user_agent, %request_id, "request rejected");
    } else {
        info!(%method, %path, %query, status, latency_ms, %client_ip, %user_agent, %request_id, "request");
    }

    response
}
