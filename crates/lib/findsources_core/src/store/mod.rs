//! Persistence for users, operators and references.
//!
//! Two backends implement the same traits: [`postgres::PgStore`] for
//! deployments and [`memory::MemoryStore`] for local runs and tests.
//! The backend is picked by [`StoreKind`], parsed from configuration.

pub mod memory;
pub mod postgres;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::models::auth::{NewUser, Operator, User, UserFilter, UserFlagsUpdate};
use crate::models::reference::{Reference, ReferenceFilter, StoredReference};

/// Errors that can occur in a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown database type: {0}")]
    UnknownBackend(String),

    #[error("Store configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Users and operators.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by the keyed hash of their external id.
    async fn find_user_by_external_id(&self, external_id_hash: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_internal_id(&self, internal_id: &str) -> StoreResult<Option<User>>;

    /// Create a user unless one with the same external id hash exists, and
    /// return the stored row either way. Never creates duplicates.
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;

    /// Returns whether any flag actually changed.
    async fn update_user_flags(&self, internal_id: &str, update: UserFlagsUpdate) -> StoreResult<bool>;

    async fn list_users(&self, filter: UserFilter) -> StoreResult<Vec<User>>;

    /// Reassign the user's references to the orphan author, then delete the
    /// user. Returns whether a user was deleted.
    async fn delete_user(&self, internal_id: &str) -> StoreResult<bool>;

    async fn find_operator(&self, username: &str) -> StoreResult<Option<Operator>>;

    /// Insert or replace an operator.
    async fn upsert_operator(&self, operator: Operator) -> StoreResult<()>;
}

/// Reference documents.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Store a new reference, assigning its id. Returns the stored reference.
    async fn insert_reference(&self, reference: Reference, author_id: &str) -> StoreResult<StoredReference>;

    async fn get_reference(&self, reference_id: &str) -> StoreResult<Option<StoredReference>>;

    async fn list_references(&self, filter: ReferenceFilter) -> StoreResult<Vec<StoredReference>>;

    async fn list_references_by_author(&self, author_id: &str) -> StoreResult<Vec<StoredReference>>;

    /// Delete a reference only if `author_id` wrote it.
    async fn delete_reference(&self, reference_id: &str, author_id: &str) -> StoreResult<bool>;

    /// Set one book link of a reference; see [`Reference::set_book_link`].
    /// Returns whether the stored reference changed.
    async fn update_reference_link(
        &self,
        reference_id: &str,
        book_name: &str,
        link_type: crate::models::reference::BookLinkType,
        link_url: &str,
    ) -> StoreResult<bool>;
}

/// Selectable store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Postgres,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

/// Both store traits, backed by the same backend instance.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn CredentialStore>,
    pub references: Arc<dyn ReferenceStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            users: store.clone(),
            references: store,
        }
    }
}

/// Open the configured backend. Postgres connects and runs migrations.
pub async fn open_store(
    kind: StoreKind,
    database_url: Option<&str>,
    max_connections: u32,
) -> StoreResult<Stores> {
    match kind {
        StoreKind::Memory => {
            info!("using in-memory store");
            Ok(Stores::memory())
        }
        StoreKind::Postgres => {
            let url = database_url
                .ok_or_else(|| StoreError::Config("DATABASE_URL is required for postgres".into()))?;
            let store = Arc::new(postgres::PgStore::connect(url, max_connections).await?);
            store.migrate().await?;
            Ok(Stores {
                users: store.clone(),
                references: store,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_parses_config_names() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("Postgres".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert_eq!("postgresql".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert!(matches!(
            "mongodb".parse::<StoreKind>(),
            Err(StoreError::UnknownBackend(_))
        ));
    }

    #[tokio::test]
    async fn open_postgres_without_url_is_config_error() {
        let result = open_store(StoreKind::Postgres, None, 1).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
