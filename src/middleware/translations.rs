//! Response localization.
//!
//! The locale is negotiated from `Accept-Language` and stored in the request
//! extensions. Error bodies are re-rendered in the negotiated language from
//! the [`ErrorDetail`] that `ApiError` leaves behind.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::error::{ErrorDetail, ErrorResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag.split(['-', '_']).next()?.trim();
        if primary.eq_ignore_ascii_case("zh") {
            Some(Locale::Zh)
        } else if primary.eq_ignore_ascii_case("en") {
            Some(Locale::En)
        } else {
            None
        }
    }

    /// Best supported language in an `Accept-Language` value. Highest q wins,
    /// ties go to the earlier entry.
    pub fn negotiate(accept_language: &str) -> Self {
        let mut best: Option<(Locale, f32)> = None;
        for entry in accept_language.split(',') {
            let mut pieces = entry.split(';');
            let Some(locale) = pieces.next().and_then(Locale::from_tag) else {
                continue;
            };
            let q = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if q <= 0.0 {
                continue;
            }
            if best.map_or(true, |(_, best_q)| q > best_q) {
                best = Some((locale, q));
            }
        }
        best.map(|(locale, _)| locale).unwrap_or_default()
    }

    fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(Locale::negotiate)
            .unwrap_or_default()
    }
}

fn zh_message(code: &str) -> Option<&'static str> {
    let message = match code {
        "validation_error" => "请求参数无效",
        "invalid_verification_code" => "验证码无效或已过期",
        "cannot_follow_self" => "不能关注自己",
        "invalid_credentials" => "账号或密码错误",
        "unauthorized" => "未登录或令牌无效",
        "forbidden" => "无权修改该资源",
        "user_not_found" => "用户不存在",
        "route_not_found" => "接口不存在",
        "conflict" => "已被注册",
        "internal_error" => "服务器内部错误",
        _ => return None,
    };
    Some(message)
}

/// Message for `detail` in `locale`, or `None` to keep the English body.
pub fn translate(locale: Locale, detail: &ErrorDetail) -> Option<String> {
    match locale {
        Locale::En => None,
        Locale::Zh => {
            let message = zh_message(detail.code)?;
            Some(match &detail.detail {
                Some(extra) => format!("{message}: {extra}"),
                None => message.to_string(),
            })
        }
    }
}

pub async fn translations(mut request: Request, next: Next) -> Response {
    let locale = Locale::from_headers(request.headers());
    request.extensions_mut().insert(locale);

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_LANGUAGE,
        HeaderValue::from_static(locale.tag()),
    );

    let Some(detail) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };
    let Some(message) = translate(locale, &detail) else {
        return response;
    };

    let body = ErrorResponse {
        error: detail.code.to_string(),
        message,
    };
    let Ok(bytes) = serde_json::to_vec(&body) else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
