//! Request and response bodies.
//!
//! Bodies use snake_case field names, matching the reference documents.
//! The session status response is the exception (`userLoggedIn`).

use chrono::{DateTime, Utc};
use findsources_core::models::auth::{FilterOption, User, UserFilter, UserFlagsUpdate};
use findsources_core::models::reference::{
    BookLinkType, Reference, ReferenceFilter, ReferenceMetadata, StoredReference,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub user_logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_author: Option<bool>,
}

impl SessionStatusResponse {
    pub fn anonymous() -> Self {
        Self {
            user_logged_in: false,
            username: None,
            is_author: None,
        }
    }
}

/// A user as shown to the user themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub username: String,
    pub is_author: bool,
    pub requested_join: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for AccountResponse {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            is_author: user.is_author,
            requested_join: user.requested_join,
            created_at: user.created_at,
        }
    }
}

/// A user as shown in the admin console. The external id hash stays
/// server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub internal_id: String,
    pub username: String,
    pub is_author: bool,
    pub requested_join: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            internal_id: user.internal_id,
            username: user.username,
            is_author: user.is_author,
            requested_join: user.requested_join,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceResponse {
    #[serde(flatten)]
    pub reference: Reference,
    pub metadata: ReferenceMetadata,
}

impl From<StoredReference> for ReferenceResponse {
    fn from(stored: StoredReference) -> Self {
        Self {
            reference: stored.reference,
            metadata: stored.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesResponse {
    pub references: Vec<ReferenceResponse>,
}

impl From<Vec<StoredReference>> for ReferencesResponse {
    fn from(stored: Vec<StoredReference>) -> Self {
        Self {
            references: stored.into_iter().map(ReferenceResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReferenceRequest {
    pub reference_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub requested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Query parameters of the identity provider callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Admin user listing filter. `1` = yes, `2` = no, otherwise any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterUsersRequest {
    #[serde(default)]
    pub requested_join: Option<i64>,
    #[serde(default)]
    pub is_author: Option<i64>,
}

impl From<FilterUsersRequest> for UserFilter {
    fn from(req: FilterUsersRequest) -> Self {
        UserFilter {
            requested_join: FilterOption::from_code(req.requested_join),
            is_author: FilterOption::from_code(req.is_author),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(alias = "internal_sub_id")]
    pub internal_id: String,
    #[serde(default)]
    pub requested_join: Option<bool>,
    #[serde(default)]
    pub is_author: Option<bool>,
}

impl UpdateUserRequest {
    pub fn flags(&self) -> UserFlagsUpdate {
        UserFlagsUpdate {
            is_author: self.is_author,
            requested_join: self.requested_join,
        }
    }
}

/// Admin reference listing filter, same codes as [`FilterUsersRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterReferencesRequest {
    #[serde(default)]
    pub has_amazon_links: Option<i64>,
    #[serde(default)]
    pub has_waterstones_links: Option<i64>,
    #[serde(default)]
    pub has_bookdepository_links: Option<i64>,
}

impl From<FilterReferencesRequest> for ReferenceFilter {
    fn from(req: FilterReferencesRequest) -> Self {
        ReferenceFilter {
            has_amazon_links: FilterOption::from_code(req.has_amazon_links),
            has_waterstones_links: FilterOption::from_code(req.has_waterstones_links),
            has_bookdepository_links: FilterOption::from_code(req.has_bookdepository_links),
        }
    }
}

/// Set (or, with an empty url, remove) one link on one book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReferenceLinkRequest {
    pub reference_id: String,
    pub book_name: String,
    pub link_type: BookLinkType,
    #[serde(default)]
    pub link_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_is_camel_case_and_sparse() {
        let json = serde_json::to_value(SessionStatusResponse::anonymous()).unwrap();
        assert_eq!(json, serde_json::json!({ "userLoggedIn": false }));
    }

    #[test]
    fn update_user_accepts_legacy_id_field() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"internal_sub_id":"abc","is_author":true}"#).unwrap();
        assert_eq!(req.internal_id, "abc");
        assert_eq!(req.flags().is_author, Some(true));
        assert_eq!(req.flags().requested_join, None);
    }

    #[test]
    fn filter_codes_convert() {
        let filter: UserFilter = FilterUsersRequest {
            requested_join: Some(1),
            is_author: Some(7),
        }
        .into();
        assert_eq!(filter.requested_join, FilterOption::Yes);
        assert_eq!(filter.is_author, FilterOption::Any);
    }
}
