use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{Duration, Utc};
use tracing::info;

use crate::error::LedgerError;
use crate::middleware::auth::{AuthUser, SESSION_COOKIE, clear_session_cookie, session_cookie};
use crate::middleware::extract::Body;
use crate::router::LedgerState;
use crate::service::password::{hash_password_blocking, new_session_token, verify_password_blocking};
use crate::types::envelope::{ApiResponse, created};
use crate::types::requests::{ChangePasswordRequest, LoginRequest, RegisterRequest, normalize_email};

async fn start_session(
    state: &LedgerState,
    jar: PrivateCookieJar,
    user_id: &str,
) -> Result<PrivateCookieJar, LedgerError> {
    let ttl_days = state.config.auth.session_ttl_days;
    let token = new_session_token();
    let expires_at = Utc::now() + Duration::days(ttl_days);
    state.storage.create_session(&token, user_id, expires_at).await?;
    Ok(jar.add(session_cookie(token, ttl_days, state.config.basic.insecure_cookie)))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<LedgerState>,
    jar: PrivateCookieJar,
    Body(req): Body<RegisterRequest>,
) -> Result<Response, LedgerError> {
    req.validate()?;
    let email = normalize_email(&req.email);
    let hash = hash_password_blocking(req.password).await?;
    let user = state
        .storage
        .create_user(&email, req.name.trim(), &hash, &state.config.ledger.default_base_currency)
        .await?;
    let jar = start_session(&state, jar, &user.id).await?;
    info!(user_id = %user.id, "user registered");
    Ok((jar, created(user)).into_response())
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<LedgerState>,
    jar: PrivateCookieJar,
    Body(req): Body<LoginRequest>,
) -> Result<Response, LedgerError> {
    let email = normalize_email(&req.email);
    if state.login_limiter.check_key(&email).is_err() {
        return Err(LedgerError::RateLimited);
    }
    let Some(user) = state.storage.find_user_by_email(&email).await? else {
        return Err(LedgerError::InvalidCredentials);
    };
    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        return Err(LedgerError::InvalidCredentials);
    }
    let jar = start_session(&state, jar, &user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((jar, ApiResponse::ok(user)).into_response())
}

/// POST /api/auth/logout -> always clears the cookie, even without a live session.
pub async fn logout(
    State(state): State<LedgerState>,
    jar: PrivateCookieJar,
) -> Result<Response, LedgerError> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        state.storage.delete_session(&token).await?;
    }
    let jar = jar.remove(clear_session_cookie());
    Ok((jar, ApiResponse::empty()).into_response())
}

/// GET /api/auth/me
pub async fn me(auth: AuthUser) -> ApiResponse<crate::db::models::DbUser> {
    ApiResponse::ok(auth.user)
}

/// POST /api/auth/change-password -> other sessions of the user are revoked.
pub async fn change_password(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, LedgerError> {
    req.validate()?;
    let ok = verify_password_blocking(req.current_password, auth.user.password_hash.clone()).await?;
    if !ok {
        return Err(LedgerError::validation("currentPassword", "is incorrect"));
    }
    let hash = hash_password_blocking(req.new_password).await?;
    state.storage.update_password(auth.id(), &hash).await?;
    let revoked = state.storage.delete_other_sessions(auth.id(), &auth.token).await?;
    info!(user_id = %auth.id(), revoked, "password changed");
    Ok(ApiResponse::empty())
}
