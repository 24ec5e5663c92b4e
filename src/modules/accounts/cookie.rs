use axum::http::{header, HeaderMap, HeaderValue};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

pub const REFRESH_COOKIE: &str = "refresh_token";

fn base(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// `Set-Cookie` value carrying the refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = base(token.to_string(), secure);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.to_string()
}

/// `Set-Cookie` value that makes the browser drop the refresh token.
pub fn clear_refresh_cookie(secure: bool) -> String {
    let mut cookie = base(String::new(), secure);
    cookie.make_removal();
    cookie.to_string()
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|parsed| parsed.ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn set_cookie_header(cookie: &str) -> Option<(header::HeaderName, HeaderValue)> {
    HeaderValue::from_str(cookie)
        .ok()
        .map(|value| (header::SET_COOKIE, value))
}
