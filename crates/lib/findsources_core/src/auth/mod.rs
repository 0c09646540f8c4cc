//! Authentication and authorization logic.
//!
//! Token codec, one-time token cache, hashing helpers and the two session
//! issuers: [`session::SessionIssuer`] for site users logging in through an
//! external identity provider, and [`operator::OperatorSessions`] for admin
//! console operators logging in with a password.

pub mod external_id;
pub mod jwt;
pub mod one_time;
pub mod operator;
pub mod password;
pub mod session;

use thiserror::Error;

use crate::store::StoreError;
use jwt::TokenError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider step failed or returned an unverified identity.
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Any token or credential validation failure.
    #[error("Unauthorized: {0}")]
    UnauthorizedUser(String),

    /// The token was valid but its subject is no longer in the store.
    #[error("User does not exist")]
    UserDoesNotExist,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidToken(_) => AuthError::UnauthorizedUser("invalid token".into()),
            TokenError::ExpiredToken => AuthError::UnauthorizedUser("token expired".into()),
            TokenError::Encode(msg) => AuthError::Internal(msg),
            TokenError::UnsupportedAlgorithm(alg) => {
                AuthError::Internal(format!("unsupported algorithm {alg}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_unauthorized() {
        assert!(matches!(
            AuthError::from(TokenError::ExpiredToken),
            AuthError::UnauthorizedUser(_)
        ));
        assert!(matches!(
            AuthError::from(TokenError::InvalidToken("bad".into())),
            AuthError::UnauthorizedUser(_)
        ));
        assert!(matches!(
            AuthError::from(TokenError::Encode("boom".into())),
            AuthError::Internal(_)
        ));
    }
}
