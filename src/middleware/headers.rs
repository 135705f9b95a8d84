//! Header stages of the request chain: no-cache, OPTIONS short-circuit and
//! security headers.

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::{macros::format_description, OffsetDateTime};

const NO_CACHE: &str = "no-cache, no-store, max-age=0, must-revalidate, value";
const EPOCH_HTTP_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";
const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";
const ALLOW_HEADERS: &str = "authorization, origin, content-type, accept";
const ALLOW: &str = "HEAD,GET,POST,PUT,PATCH,DELETE,OPTIONS";
const HSTS: &str = "max-age=31536000";

const X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

fn http_date(at: OffsetDateTime) -> Option<HeaderValue> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let text = at.to_offset(time::UtcOffset::UTC).format(&format).ok()?;
    HeaderValue::from_str(&text).ok()
}

fn set_default(headers: &mut HeaderMap, name: HeaderName, value: HeaderValue) {
    headers.entry(name).or_insert(value);
}

/// Stops clients and proxies from caching API responses. Handlers may still
/// set their own caching headers.
pub async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    set_default(headers, header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    set_default(headers, header::EXPIRES, HeaderValue::from_static(EPOCH_HTTP_DATE));
    if let Some(now) = http_date(OffsetDateTime::now_utc()) {
        set_default(headers, header::LAST_MODIFIED, now);
    }
    response
}

/// Answers every OPTIONS request directly with the CORS preflight headers.
pub async fn options(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
            (header::ALLOW, ALLOW),
            (header::CONTENT_TYPE, "application/json"),
        ],
    )
        .into_response()
}

fn is_https(request: &Request) -> bool {
    request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get(X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Security and browser-hardening response headers.
pub async fn secure(request: Request, next: Next) -> Response {
    let https = is_https(&request);
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    if https {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    }
    response
}
