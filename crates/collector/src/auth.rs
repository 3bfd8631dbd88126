use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Secret presented with a submission: `X-API-KEY` wins over a bearer token.
pub fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(API_KEY_HEADER)
        && let Ok(key) = value.to_str()
        && !key.trim().is_empty()
    {
        return Some(key.trim().to_string());
    }

    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}
