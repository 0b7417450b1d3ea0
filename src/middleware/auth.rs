use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use time::Duration;

use crate::db::models::DbUser;
use crate::error::LedgerError;
use crate::router::LedgerState;

pub const SESSION_COOKIE: &str = "ledger_session";

/// The signed-in user, resolved from the private session cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: DbUser,
    pub token: String,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }
}

impl FromRequestParts<LedgerState> for AuthUser {
    type Rejection = LedgerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &LedgerState,
    ) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.key());
        let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) else {
            return Err(LedgerError::Unauthorized);
        };
        match state.storage.user_for_session(&token).await? {
            Some(user) => Ok(Self { user, token }),
            None => Err(LedgerError::Unauthorized),
        }
    }
}

/// Rejects with 403 unless the server runs in development.
#[derive(Debug, Clone, Copy)]
pub struct DevOnly;

impl FromRequestParts<LedgerState> for DevOnly {
    type Rejection = LedgerError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &LedgerState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.is_development() {
            Ok(Self)
        } else {
            Err(LedgerError::Forbidden(
                "Only available in development".to_string(),
            ))
        }
    }
}

/// Per-email login throttle.
pub fn login_limiter(attempts_per_minute: u32) -> DefaultKeyedRateLimiter<String> {
    let per_minute = NonZeroU32::new(attempts_per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::keyed(Quota::per_minute(per_minute))
}

pub fn session_cookie(token: String, ttl_days: i64, insecure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!insecure)
        .max_age(Duration::days(ttl_days))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build(Cookie::new(SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
