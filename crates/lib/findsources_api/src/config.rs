//! API server configuration.

use std::collections::HashMap;

use findsources_core::auth::jwt::{parse_algorithm, resolve_jwt_secret};
use findsources_core::identity::google::DEFAULT_DISCOVERY_URL;
use findsources_core::identity::{IdentityProviderKind, ProviderSettings};
use findsources_core::store::StoreKind;
use chrono::TimeDelta;
use jsonwebtoken::Algorithm;
use thiserror::Error;

/// Longest accepted token lifetime: one year.
pub const MAX_TOKEN_MINUTES: i64 = 365 * 24 * 60;
/// Longest accepted cookie max-age: one year.
pub const MAX_COOKIE_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Invalid configuration value.
#[derive(Debug, Error)]
#[error("invalid value for {var}: {message}")]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(var: &'static str, message: impl Into<String>) -> Self {
        Self {
            var,
            message: message.into(),
        }
    }
}

/// Configuration shared by the admin, producer and consumer services.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8000").
    pub bind_addr: String,
    pub database_type: StoreKind,
    pub database_url: Option<String>,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    /// Lifetime of the one-time token handed out after external login.
    pub auth_token_expire_minutes: i64,
    pub access_cookie_expire_seconds: i64,
    /// Local runs: cookies without `Secure`, CORS open to the dev frontend.
    pub local_deployment: bool,
    pub auth_provider: IdentityProviderKind,
    pub provider: ProviderSettings,
    pub frontend_url: String,
    /// Admin console page to land on after login/logout.
    pub home_url: String,
    pub external_id_key: String,
    pub elasticsearch_host: String,
    pub elasticsearch_index: String,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                         |
    /// |--------------------------------|---------------------------------|
    /// | `BIND_ADDR`                    | `127.0.0.1:8000`                |
    /// | `DATABASE_TYPE`                | `memory`                        |
    /// | `DATABASE_URL`                 | unset                           |
    /// | `JWT_SECRET_KEY`               | generated & persisted to file   |
    /// | `ALGORITHM`                    | `HS256`                         |
    /// | `ACCESS_TOKEN_EXPIRE_MINUTES`  | `15`                            |
    /// | `AUTH_TOKEN_EXPIRE_MINUTES`    | `2`                             |
    /// | `ACCESS_COOKIE_EXPIRE_SECONDS` | `900`                           |
    /// | `LOCAL_DEPLOYMENT`             | `false`                         |
    /// | `AUTH_PROVIDER`                | `google`                        |
    /// | `FRONTEND_URL`                 | `http://localhost:3000`         |
    /// | `HOME_URL`                     | `http://localhost:3000/Home`    |
    /// | `ELASTICSEARCH_HOST`           | `http://localhost:9200`         |
    /// | `ELASTICSEARCH_INDEX`          | `references`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Access token lifetime, clamped to `1..=MAX_TOKEN_MINUTES`.
    pub fn access_token_ttl(&self) -> TimeDelta {
        TimeDelta::minutes(self.access_token_expire_minutes.clamp(1, MAX_TOKEN_MINUTES))
    }

    /// One-time token lifetime, clamped like [`Self::access_token_ttl`].
    pub fn one_time_token_ttl(&self) -> TimeDelta {
        TimeDelta::minutes(self.auth_token_expire_minutes.clamp(1, MAX_TOKEN_MINUTES))
    }

    /// Build from a fixed set of variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let database_type = or("DATABASE_TYPE", "memory")
            .parse::<StoreKind>()
            .map_err(|e| ConfigError::new("DATABASE_TYPE", e.to_string()))?;
        let algorithm = parse_algorithm(&or("ALGORITHM", "HS256"))
            .map_err(|e| ConfigError::new("ALGORITHM", e.to_string()))?;
        let auth_provider = or("AUTH_PROVIDER", "google")
            .parse::<IdentityProviderKind>()
            .map_err(|e| ConfigError::new("AUTH_PROVIDER", e.to_string()))?;

        Ok(Self {
            bind_addr: or("BIND_ADDR", "127.0.0.1:8000"),
            database_type,
            database_url: get("DATABASE_URL"),
            jwt_secret: get("JWT_SECRET_KEY").unwrap_or_else(resolve_jwt_secret),
            algorithm,
            access_token_expire_minutes: parse_minutes(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 15)?,
            auth_token_expire_minutes: parse_minutes(&get, "AUTH_TOKEN_EXPIRE_MINUTES", 2)?,
            access_cookie_expire_seconds: parse_positive(
                &get,
                "ACCESS_COOKIE_EXPIRE_SECONDS",
                900,
                MAX_COOKIE_SECONDS,
            )?,
            local_deployment: parse_bool(&get, "LOCAL_DEPLOYMENT")?,
            auth_provider,
            provider: ProviderSettings {
                client_id: or("GOOGLE_CLIENT_ID", ""),
                client_secret: or("GOOGLE_CLIENT_SECRET", ""),
                redirect_url: or("GOOGLE_REDIRECT_URL", "http://localhost:8000/login-callback"),
                discovery_url: or("GOOGLE_DISCOVERY_URL", DEFAULT_DISCOVERY_URL),
            },
            frontend_url: or("FRONTEND_URL", "http://localhost:3000"),
            home_url: or("HOME_URL", "http://localhost:3000/Home"),
            external_id_key: or("EXTERNAL_ID_KEY", ""),
            elasticsearch_host: or("ELASTICSEARCH_HOST", "http://localhost:9200"),
            elasticsearch_index: or("ELASTICSEARCH_INDEX", "references"),
        })
    }
}

fn parse_positive(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let Some(raw) = get(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 && v <= max => Ok(v),
        _ => Err(ConfigError::new(
            var,
            format!("expected an integer between 1 and {max}, got '{raw}'"),
        )),
    }
}

/// A token lifetime in minutes that converts to a [`TimeDelta`].
fn parse_minutes(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: i64,
) -> Result<i64, ConfigError> {
    let minutes = parse_positive(get, var, default, MAX_TOKEN_MINUTES)?;
    TimeDelta::try_minutes(minutes)
        .map(|_| minutes)
        .ok_or_else(|| ConfigError::new(var, format!("{minutes} minutes is out of range")))
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    let Some(raw) = get(var) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::new(var, format!("expected a boolean, got '{raw}'"))),
    }
}
