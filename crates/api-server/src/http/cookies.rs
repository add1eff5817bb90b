use axum::http::header::{COOKIE, HeaderMap};
use axum::http::HeaderValue;
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "sql_chat_session";

/// Reads the session id from any `Cookie` header. Values that are not a v4 UUID are ignored.
pub(super) fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
        .filter(|session_id| session_id.get_version_num() == 4)
}

pub(super) fn session_cookie(session_id: Uuid, max_age_seconds: i64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={session_id}; Path=/; Max-Age={max_age_seconds}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }

    // The cookie is built from a UUID and integers only.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}
