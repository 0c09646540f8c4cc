//! Admin console handlers.

use axum::Json;
use axum::extract::{Extension, State};
use axum::response::Response;
use axum_extra::extract::CookieJar;
use findsources_core::models::auth::{UserFilter, UserFlagsUpdate};
use findsources_core::models::reference::ReferenceFilter;
use tracing::info;

use super::{JsonBody, found};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{CurrentOperator, optional_operator};
use crate::models::{
    FilterReferencesRequest, FilterUsersRequest, LoginRequest, ReferencesResponse,
    SessionStatusResponse, SuccessResponse, UpdateReferenceLinkRequest, UpdateUserRequest,
    UserResponse, UsersResponse,
};
use crate::services::cookies;

/// `POST /login`: check operator credentials, set the access cookie and
/// redirect to the console home page.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AppResult<(CookieJar, Response)> {
    let token = state.operators.login(&body.username, &body.password).await?;
    let jar = jar.add(cookies::access_cookie(
        &token,
        state.config.access_cookie_expire_seconds,
        state.secure_cookies(),
    ));
    Ok((jar, found(&state.config.home_url)))
}

/// `GET /logout`
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let jar = jar.add(cookies::clear_access_cookie(state.secure_cookies()));
    (jar, found(&state.config.home_url))
}

/// `GET /user-session-status/`: whether the caller is a signed-in operator.
pub async fn user_session_status(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Json<SessionStatusResponse>> {
    let status = match optional_operator(&state, &jar).await? {
        Some(operator) => SessionStatusResponse {
            user_logged_in: true,
            username: Some(operator.username),
            is_author: None,
        },
        None => SessionStatusResponse::anonymous(),
    };
    Ok(Json(status))
}

/// `POST /users`: list users, filtered by role flags.
pub async fn list_users(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<FilterUsersRequest>,
) -> AppResult<Json<UsersResponse>> {
    let users = state.stores.users.list_users(UserFilter::from(body)).await?;
    Ok(Json(UsersResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// `POST /user`: change a user's role flags.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentOperator(operator)): Extension<CurrentOperator>,
    JsonBody(body): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let update: UserFlagsUpdate = body.flags();
    if update.is_empty() {
        return Err(AppError::Validation("nothing to update".into()));
    }
    let success = state
        .stores
        .users
        .update_user_flags(&body.internal_id, update)
        .await?;
    info!(
        operator = %operator.username,
        user_id = %body.internal_id,
        success,
        "user flags updated"
    );
    Ok(Json(SuccessResponse { success }))
}

/// `POST /references`: list references, filtered by which shops they
/// link to.
pub async fn list_references(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<FilterReferencesRequest>,
) -> AppResult<Json<ReferencesResponse>> {
    let references = state
        .stores
        .references
        .list_references(ReferenceFilter::from(body))
        .await?;
    Ok(Json(references.into()))
}

/// `POST /reference`: set, replace or remove one book link.
pub async fn update_reference_link(
    State(state): State<AppState>,
    Extension(CurrentOperator(operator)): Extension<CurrentOperator>,
    JsonBody(body): JsonBody<UpdateReferenceLinkRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state
        .stores
        .references
        .update_reference_link(&body.reference_id, &body.book_name, body.link_type, &body.link_url)
        .await?;
    info!(
        operator = %operator.username,
        reference_id = %body.reference_id,
        link_type = body.link_type.as_str(),
        success,
        "reference link updated"
    );
    Ok(Json(SuccessResponse { success }))
}
