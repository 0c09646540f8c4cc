//! Site user sessions.
//!
//! Login runs in two steps. The identity provider callback resolves (or
//! creates) the user and mints a short-lived one-time token that the
//! frontend receives in a redirect URL. The frontend then exchanges that
//! token, once, for an access token held in a cookie. Every protected
//! request decodes the access token and re-reads the user from the store.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use super::AuthError;
use super::external_id::hash_external_id;
use super::jwt::TokenCodec;
use super::one_time::{OneTimeTokenCache, generate_token};
use crate::identity::{AuthorizationRequest, ExternalIdentity, IdentityProvider};
use crate::models::auth::{NewUser, User};
use crate::store::CredentialStore;

/// Token lifetimes and hashing key for [`SessionIssuer`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub access_token_ttl: Duration,
    pub one_time_token_ttl: Duration,
    /// Key mixed into external id hashes.
    pub external_id_key: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::minutes(15),
            one_time_token_ttl: Duration::minutes(2),
            external_id_key: String::new(),
        }
    }
}

/// Result of a successful provider callback.
#[derive(Debug, Clone)]
pub struct OneTimeGrant {
    pub token: String,
    pub user: User,
}

/// Result of exchanging a one-time token.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub access_token: String,
    pub user: User,
}

pub struct SessionIssuer {
    users: Arc<dyn CredentialStore>,
    provider: Arc<dyn IdentityProvider>,
    one_time: Arc<OneTimeTokenCache>,
    codec: TokenCodec,
    settings: SessionSettings,
}

impl SessionIssuer {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
        one_time: Arc<OneTimeTokenCache>,
        codec: TokenCodec,
        settings: SessionSettings,
    ) -> Self {
        Self {
            users,
            provider,
            one_time,
            codec,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Start an external login: the provider URI and its CSRF state.
    pub async fn authorization_request(&self) -> Result<AuthorizationRequest, AuthError> {
        self.provider.get_redirect_uri().await.map_err(|e| {
            warn!(provider = self.provider.name(), error = %e, "failed to build redirect uri");
            AuthError::AuthorizationFailed(e.to_string())
        })
    }

    /// Handle the provider callback: exchange `code`, resolve the user and
    /// mint a one-time token for them.
    ///
    /// An unverified identity fails before any user is created.
    pub async fn complete_external_login(&self, code: &str) -> Result<OneTimeGrant, AuthError> {
        let identity = self
            .provider
            .exchange_code_for_identity(code)
            .await
            .map_err(|e| {
                warn!(provider = self.provider.name(), error = %e, "code exchange failed");
                AuthError::AuthorizationFailed(e.to_string())
            })?;
        if !identity.email_verified {
            info!(provider = self.provider.name(), "rejected login with unverified email");
            return Err(AuthError::AuthorizationFailed("email not verified".into()));
        }

        let user = self.resolve_user(&identity).await?;
        let token = generate_token();
        self.one_time
            .put(token.clone(), user.internal_id.clone(), self.settings.one_time_token_ttl);
        debug!(user_id = %user.internal_id, "minted one-time token");
        Ok(OneTimeGrant { token, user })
    }

    /// Find the user for `identity`, creating them on first login.
    pub async fn resolve_user(&self, identity: &ExternalIdentity) -> Result<User, AuthError> {
        let external_id_hash = hash_external_id(&self.settings.external_id_key, &identity.external_id);
        if let Some(user) = self.users.find_user_by_external_id(&external_id_hash).await? {
            return Ok(user);
        }
        let user = self
            .users
            .create_user(NewUser {
                external_id_hash,
                username: identity.username.clone(),
            })
            .await?;
        info!(user_id = %user.internal_id, "created user on first login");
        Ok(user)
    }

    /// Exchange a one-time token for an access token. Each one-time token
    /// works once.
    pub async fn exchange(&self, one_time_token: &str) -> Result<AccessGrant, AuthError> {
        let internal_id = self
            .one_time
            .take(one_time_token)
            .ok_or_else(|| AuthError::UnauthorizedUser("token expired or already used".into()))?;
        let user = self
            .users
            .find_user_by_internal_id(&internal_id)
            .await?
            .ok_or(AuthError::UserDoesNotExist)?;
        let access_token = self
            .codec
            .encode(&user.internal_id, self.settings.access_token_ttl)?;
        info!(user_id = %user.internal_id, "issued access token");
        Ok(AccessGrant { access_token, user })
    }

    /// Validate an access token and load its user.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self.codec.decode(access_token)?;
        self.users
            .find_user_by_internal_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserDoesNotExist)
    }
}
