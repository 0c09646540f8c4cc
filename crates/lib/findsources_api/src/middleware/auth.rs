//! Authentication middleware: access cookie extraction and session lookup.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use findsources_core::auth::AuthError;
use findsources_core::models::auth::{Operator, User};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies;

/// The signed-in site user, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// The signed-in admin operator, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct CurrentOperator(pub Operator);

fn access_token(request: &Request) -> Result<String, AppError> {
    let jar = CookieJar::from_headers(request.headers());
    cookies::access_token(&jar).ok_or_else(|| AppError::Unauthorized("Missing access token".into()))
}

/// Axum middleware: validates the `access_token` cookie, re-reads the user
/// from the store and injects [`CurrentUser`].
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = access_token(&request)?;
    let user = state.sessions.authenticate(&token).await?;
    debug!(user_id = %user.internal_id, "authenticated user");
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Axum middleware: like [`require_user`] for admin console operators.
pub async fn require_operator(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = access_token(&request)?;
    let operator = state.operators.authenticate(&token).await?;
    request.extensions_mut().insert(CurrentOperator(operator));
    Ok(next.run(request).await)
}

/// Session lookup for routes that tolerate anonymous callers.
///
/// A missing, invalid or expired cookie, or a user that no longer exists,
/// is `Ok(None)`. Store failures still propagate.
pub async fn optional_user(state: &AppState, jar: &CookieJar) -> Result<Option<User>, AppError> {
    let Some(token) = cookies::access_token(jar) else {
        return Ok(None);
    };
    match state.sessions.authenticate(&token).await {
        Ok(user) => Ok(Some(user)),
        Err(AuthError::UnauthorizedUser(_) | AuthError::UserDoesNotExist) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Operator counterpart of [`optional_user`].
pub async fn optional_operator(state: &AppState, jar: &CookieJar) -> Result<Option<Operator>, AppError> {
    let Some(token) = cookies::access_token(jar) else {
        return Ok(None);
    };
    match state.operators.authenticate(&token).await {
        Ok(operator) => Ok(Some(operator)),
        Err(AuthError::UnauthorizedUser(_) | AuthError::UserDoesNotExist) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
