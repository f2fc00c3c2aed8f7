use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;

use crate::config::Config;

const API_KEY_HEADER: &str = "X-API-Key";

/// sha256 hex of the admin api key, attached to the admin router as an extension
#[derive(Clone, Debug)]
pub struct ApiKeyHash(pub String);

impl ApiKeyHash {
    pub fn from_key(key: &str) -> Self {
        Self(Config::hash_api_key(key))
    }

    /// hash `provided` and compare without bailing on the first differing byte
    pub fn matches(&self, provided: &str) -> bool {
        let provided = Config::hash_api_key(provided);
        provided.len() == self.0.len()
            && provided
                .bytes()
                .zip(self.0.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

// X-API-Key, or a bearer token for clients that can only set Authorization
fn provided_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// reject admin requests without a valid api key
///
/// A router without an [`ApiKeyHash`] extension fails closed with 500.
pub async fn validate_api_key(
    Extension(expected): Extension<ApiKeyHash>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(provided) = provided_key(req.headers()) else {
        tracing::warn!(path = %req.uri().path(), "Missing admin api key");
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !expected.matches(provided) {
        tracing::warn!(path = %req.uri().path(), "🚫 Invalid API key attempt");
        return Err(StatusCode::UNAUTHORIZED);
    }

    tracing::trace!("API key validated");
    Ok(next.run(req).await)
}

fn security_headers() -> [(HeaderName, HeaderValue); 5] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        // share ids live in urls, never hand them to third parties
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
    ]
}

/// security headers for every response; values a handler already set are kept
pub async fn add_security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in security_headers() {
        headers.entry(name).or_insert(value);
    }

    response
}
