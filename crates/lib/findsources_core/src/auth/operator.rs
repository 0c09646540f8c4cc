//! Admin console operator sessions (username + password).

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use super::AuthError;
use super::jwt::TokenCodec;
use super::password::{hash_password, verify_password};
use crate::models::auth::Operator;
use crate::store::CredentialStore;

const MIN_CREDENTIAL_LEN: usize = 4;

pub struct OperatorSessions {
    operators: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    access_token_ttl: Duration,
}

impl OperatorSessions {
    pub fn new(operators: Arc<dyn CredentialStore>, codec: TokenCodec, access_token_ttl: Duration) -> Self {
        Self {
            operators,
            codec,
            access_token_ttl,
        }
    }

    /// Check credentials and mint an access token whose subject is the
    /// operator's username.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if username.chars().count() < MIN_CREDENTIAL_LEN || password.chars().count() < MIN_CREDENTIAL_LEN {
            return Err(AuthError::Validation(format!(
                "username and password must be at least {MIN_CREDENTIAL_LEN} characters"
            )));
        }
        let invalid = || AuthError::UnauthorizedUser("invalid credentials".into());
        let Some(operator) = self.operators.find_operator(username).await? else {
            warn!(%username, "login for unknown operator");
            return Err(invalid());
        };
        if !verify_password(password, &operator.password_hash)? {
            warn!(%username, "operator login with wrong password");
            return Err(invalid());
        }
        let token = self.codec.encode(&operator.username, self.access_token_ttl)?;
        info!(%username, "operator logged in");
        Ok(token)
    }

    /// Validate an access token and load its operator.
    pub async fn authenticate(&self, access_token: &str) -> Result<Operator, AuthError> {
        let claims = self.codec.decode(access_token)?;
        self.operators
            .find_operator(&claims.sub)
            .await?
            .ok_or(AuthError::UserDoesNotExist)
    }

    /// Create or reset an operator account.
    pub async fn seed_operator(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let password_hash = hash_password(username, password)?;
        self.operators
            .upsert_operator(Operator {
                username: username.to_string(),
                password_hash,
            })
            .await?;
        info!(%username, "operator account seeded");
        Ok(())
    }
}
