//! Account domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! shapes (which use camelCase and hide hashed fields).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A site user, created on first successful external login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-generated, stable id. Access tokens carry this as `sub`.
    pub internal_id: String,
    /// Keyed hash of the identity provider's subject id.
    pub external_id_hash: String,
    pub username: String,
    pub is_author: bool,
    pub requested_join: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id_hash: String,
    pub username: String,
}

/// Admin console operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub username: String,
    pub password_hash: String,
}

/// Partial update of a user's role flags. `None` leaves a flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFlagsUpdate {
    pub is_author: Option<bool>,
    pub requested_join: Option<bool>,
}

impl UserFlagsUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_author.is_none() && self.requested_join.is_none()
    }

    /// Apply to `user`, returning whether anything changed.
    pub fn apply(&self, user: &mut User) -> bool {
        let mut changed = false;
        if let Some(v) = self.is_author
            && user.is_author != v
        {
            user.is_author = v;
            changed = true;
        }
        if let Some(v) = self.requested_join
            && user.requested_join != v
        {
            user.requested_join = v;
            changed = true;
        }
        changed
    }
}

/// Tri-state filter used by the admin listings: `1` = yes, `2` = no,
/// anything else (or absent) = don't filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterOption {
    #[default]
    Any,
    Yes,
    No,
}

impl FilterOption {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => FilterOption::Yes,
            Some(2) => FilterOption::No,
            _ => FilterOption::Any,
        }
    }

    pub fn matches(self, value: bool) -> bool {
        match self {
            FilterOption::Any => true,
            FilterOption::Yes => value,
            FilterOption::No => !value,
        }
    }

    /// `Some(expected)` when the filter constrains the value.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            FilterOption::Any => None,
            FilterOption::Yes => Some(true),
            FilterOption::No => Some(false),
        }
    }
}

/// Filter for listing users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub requested_join: FilterOption,
    pub is_author: FilterOption,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.requested_join.matches(user.requested_join) && self.is_author.matches(user.is_author)
    }
}
