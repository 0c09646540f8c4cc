//! Cookie service: set/get/clear the httpOnly session cookies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Cookie holding `Bearer <access token>`.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie holding the OAuth `state` between redirect and callback.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Lifetime of the OAuth state cookie.
const OAUTH_STATE_MAX_AGE: Duration = Duration::minutes(10);

fn base(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Build the access cookie. Its max-age is configured separately from the
/// token's own expiry.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = base(ACCESS_COOKIE, format!("Bearer {token}"), secure);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie
}

/// Build an expired access cookie to clear the session.
pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = base(ACCESS_COOKIE, String::new(), secure);
    cookie.set_max_age(Duration::ZERO);
    cookie
}

pub fn oauth_state_cookie(state: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = base(OAUTH_STATE_COOKIE, state.to_string(), secure);
    cookie.set_max_age(OAUTH_STATE_MAX_AGE);
    cookie
}

pub fn clear_oauth_state_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = base(OAUTH_STATE_COOKIE, String::new(), secure);
    cookie.set_max_age(Duration::ZERO);
    cookie
}

/// Extract the access token from the jar, stripping the `Bearer` scheme.
pub fn access_token(jar: &CookieJar) -> Option<String> {
    let value = jar.get(ACCESS_COOKIE)?.value_trimmed().to_string();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Bearer%20"))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}
