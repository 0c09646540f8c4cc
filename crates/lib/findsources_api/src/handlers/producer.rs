//! Producer API handlers: external login, account and author references.

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use findsources_core::auth::AuthError;
use findsources_core::models::auth::UserFlagsUpdate;
use findsources_core::models::reference::{Category, Rating, Reference};
use tracing::{info, warn};
use url::Url;

use super::JsonBody;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{CurrentUser, optional_user};
use crate::models::{
    AccountResponse, CategoriesResponse, DeleteReferenceRequest, DeletedResponse, JoinResponse,
    LoginCallbackParams, ReferenceResponse, ReferencesResponse, SessionStatusResponse,
};
use crate::services::cookies;

/// Frontend URL with one query parameter appended.
fn frontend_redirect(state: &AppState, key: &str, value: &str) -> AppResult<Redirect> {
    let mut url = Url::parse(&state.config.frontend_url)
        .map_err(|e| AppError::Internal(format!("invalid FRONTEND_URL: {e}")))?;
    url.query_pairs_mut().append_pair(key, value);
    Ok(Redirect::temporary(url.as_str()))
}

/// `GET /login-redirect`: send the browser to the identity provider, or
/// back to the frontend with `loginError=true` if the provider is unusable.
pub async fn login_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    match state.sessions.authorization_request().await {
        Ok(request) => {
            let jar = jar.add(cookies::oauth_state_cookie(&request.state, state.secure_cookies()));
            Ok((jar, Redirect::temporary(&request.uri)))
        }
        Err(AuthError::AuthorizationFailed(_)) => {
            Ok((jar, frontend_redirect(&state, "loginError", "true")?))
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /login-callback`: provider callback. Redirects to the frontend with
/// a one-time `authToken`, or with `loginError=true`.
pub async fn login_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<LoginCallbackParams>,
) -> AppResult<(CookieJar, Redirect)> {
    let expected_state = jar
        .get(cookies::OAUTH_STATE_COOKIE)
        .map(|c| c.value().to_string());
    let jar = jar.add(cookies::clear_oauth_state_cookie(state.secure_cookies()));

    if let Some(error) = &params.error {
        warn!(%error, "identity provider returned an error");
        return Ok((jar, frontend_redirect(&state, "loginError", "true")?));
    }
    let state_matches = matches!(
        (&expected_state, &params.state),
        (Some(expected), Some(got)) if expected == got
    );
    let Some(code) = params.code.as_deref().filter(|_| state_matches) else {
        warn!("login callback without code or with mismatched state");
        return Ok((jar, frontend_redirect(&state, "loginError", "true")?));
    };

    match state.sessions.complete_external_login(code).await {
        Ok(grant) => Ok((jar, frontend_redirect(&state, "authToken", &grant.token)?)),
        Err(AuthError::AuthorizationFailed(reason)) => {
            info!(%reason, "external login failed");
            Ok((jar, frontend_redirect(&state, "loginError", "true")?))
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET|POST /login/`: exchange the one-time token in
/// `Authorization: Bearer` for the access cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> AppResult<(CookieJar, Json<AccountResponse>)> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing one-time token".into()))?;

    let grant = state.sessions.exchange(token).await?;
    let jar = jar.add(cookies::access_cookie(
        &grant.access_token,
        state.config.access_cookie_expire_seconds,
        state.secure_cookies(),
    ));
    Ok((jar, Json(AccountResponse::from(&grant.user))))
}

/// `GET|POST /logout/`: clear the access cookie.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<SessionStatusResponse>) {
    let jar = jar.add(cookies::clear_access_cookie(state.secure_cookies()));
    (jar, Json(SessionStatusResponse::anonymous()))
}

/// `GET /user-session-status/`: whether the caller is signed in.
pub async fn user_session_status(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Json<SessionStatusResponse>> {
    let status = match optional_user(&state, &jar).await? {
        Some(user) => SessionStatusResponse {
            user_logged_in: true,
            username: Some(user.username),
            is_author: Some(user.is_author),
        },
        None => SessionStatusResponse::anonymous(),
    };
    Ok(Json(status))
}

/// `GET /get-categories/`
pub async fn get_categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: Category::ALL.iter().map(|c| c.to_string()).collect(),
    })
}

/// `POST|PUT /insert-reference/`: store a reference written by the caller.
pub async fn insert_reference(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(mut reference): JsonBody<Reference>,
) -> AppResult<Json<ReferenceResponse>> {
    if !user.is_author {
        return Err(AppError::Forbidden("only authors can add references".into()));
    }
    reference.validate().map_err(AppError::Validation)?;
    reference.rating = Some(Rating::default());

    let stored = state
        .stores
        .references
        .insert_reference(reference, &user.internal_id)
        .await?;
    info!(
        user_id = %user.internal_id,
        reference_id = stored.reference.reference_id.as_deref().unwrap_or_default(),
        "reference inserted"
    );
    Ok(Json(stored.into()))
}

/// `GET|POST /get-references/`: the caller's references.
pub async fn get_references(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<ReferencesResponse>> {
    let references = state
        .stores
        .references
        .list_references_by_author(&user.internal_id)
        .await?;
    Ok(Json(references.into()))
}

/// `POST|DELETE /delete-reference/`: delete one of the caller's references.
pub async fn delete_reference(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(body): JsonBody<DeleteReferenceRequest>,
) -> AppResult<Json<DeletedResponse>> {
    let deleted = state
        .stores
        .references
        .delete_reference(&body.reference_id, &user.internal_id)
        .await?;
    if deleted {
        info!(user_id = %user.internal_id, reference_id = %body.reference_id, "reference deleted");
    }
    Ok(Json(DeletedResponse { deleted }))
}

/// `POST|PUT /join/`: ask to become an author.
pub async fn join(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<JoinResponse>> {
    let update = UserFlagsUpdate {
        requested_join: Some(true),
        is_author: None,
    };
    let changed = state
        .stores
        .users
        .update_user_flags(&user.internal_id, update)
        .await?;
    Ok(Json(JoinResponse {
        requested: changed || user.requested_join,
    }))
}

/// `GET /get-account/`
pub async fn get_account(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<AccountResponse> {
    Json(AccountResponse::from(&user))
}

/// `POST|DELETE /delete-account/`: delete the caller. Their references
/// stay, reassigned to the orphan author.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<DeletedResponse>)> {
    let deleted = state.stores.users.delete_user(&user.internal_id).await?;
    info!(user_id = %user.internal_id, deleted, "account deletion");
    let jar = jar.add(cookies::clear_access_cookie(state.secure_cookies()));
    Ok((jar, Json(DeletedResponse { deleted })))
}
