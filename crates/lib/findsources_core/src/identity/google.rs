//! Google OpenID Connect provider.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{
    AuthorizationRequest, ExternalIdentity, IdentityError, IdentityProvider, ProviderSettings,
    generate_state,
};

pub const DEFAULT_DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";

const SCOPES: &str = "openid email profile";

/// Endpoints from the OpenID discovery document.
#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

impl UserInfo {
    fn into_identity(self) -> ExternalIdentity {
        let username = self
            .given_name
            .or(self.name)
            .unwrap_or_else(|| "user".to_string());
        ExternalIdentity {
            username,
            external_id: self.sub,
            email_verified: self.email_verified,
        }
    }
}

pub struct GoogleProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
    discovery: OnceCell<Discovery>,
}

impl GoogleProvider {
    pub fn new(settings: ProviderSettings, http: reqwest::Client) -> Self {
        Self {
            settings,
            http,
            discovery: OnceCell::new(),
        }
    }

    /// Fetch the discovery document once and keep it.
    async fn discovery(&self) -> Result<&Discovery, IdentityError> {
        self.discovery
            .get_or_try_init(|| async {
                debug!(url = %self.settings.discovery_url, "fetching openid discovery document");
                let doc = self
                    .http
                    .get(&self.settings.discovery_url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Discovery>()
                    .await?;
                Ok::<_, IdentityError>(doc)
            })
            .await
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn get_redirect_uri(&self) -> Result<AuthorizationRequest, IdentityError> {
        let discovery = self.discovery().await?;
        let state = generate_state();
        let uri = url::Url::parse_with_params(
            &discovery.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("scope", SCOPES),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| IdentityError::Provider(format!("bad authorization endpoint: {e}")))?;
        Ok(AuthorizationRequest {
            uri: uri.into(),
            state,
        })
    }

    async fn exchange_code_for_identity(&self, code: &str) -> Result<ExternalIdentity, IdentityError> {
        let discovery = self.discovery().await?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", self.settings.redirect_url.as_str()),
        ];
        let resp = self
            .http
            .post(&discovery.token_endpoint)
            .form(&params)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "google token exchange rejected");
            return Err(IdentityError::Provider(format!(
                "token exchange HTTP {status}: {body}"
            )));
        }
        let tokens = resp.json::<TokenResponse>().await?;

        let info = self
            .http
            .get(&discovery.userinfo_endpoint)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<UserInfo>()
            .await?;
        Ok(info.into_identity())
    }
}
