//! External identity providers.
//!
//! A provider hands out an authorization URI for the browser redirect and
//! later turns the authorization code from the callback into an
//! [`ExternalIdentity`]. The active provider is picked from configuration
//! through [`IdentityProviderKind`].

pub mod google;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

/// Identity provider errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Unknown identity provider: {0}")]
    UnknownProvider(String),
}

/// A user identity as asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub username: String,
    /// The provider's subject id, in clear. Hashed before it is stored.
    pub external_id: String,
    pub email_verified: bool,
}

/// Where to send the browser, and the CSRF state it must come back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub uri: String,
    pub state: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_redirect_uri(&self) -> Result<AuthorizationRequest, IdentityError>;

    async fn exchange_code_for_identity(&self, code: &str) -> Result<ExternalIdentity, IdentityError>;
}

/// Configured identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityProviderKind {
    Google,
}

impl fmt::Display for IdentityProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityProviderKind::Google => f.write_str("google"),
        }
    }
}

impl FromStr for IdentityProviderKind {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(IdentityProviderKind::Google),
            other => Err(IdentityError::UnknownProvider(other.to_string())),
        }
    }
}

/// OAuth client settings shared by all providers.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// OpenID discovery document URL.
    pub discovery_url: String,
}

/// Build the provider selected by `kind`.
pub fn build_provider(
    kind: IdentityProviderKind,
    settings: ProviderSettings,
    http: reqwest::Client,
) -> Arc<dyn IdentityProvider> {
    match kind {
        IdentityProviderKind::Google => Arc::new(google::GoogleProvider::new(settings, http)),
    }
}

/// Generate a random OAuth `state` value (URL-safe).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses() {
        assert_eq!(
            "Google".parse::<IdentityProviderKind>().unwrap(),
            IdentityProviderKind::Google
        );
        assert!(matches!(
            "github".parse::<IdentityProviderKind>(),
            Err(IdentityError::UnknownProvider(_))
        ));
    }

    #[test]
    fn states_are_random() {
        assert_ne!(generate_state(), generate_state());
        assert_eq!(generate_state().len(), 32);
    }
}
