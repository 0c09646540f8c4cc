//! PostgreSQL store backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::{CredentialStore, ReferenceStore, StoreResult};
use crate::models::auth::{NewUser, Operator, User, UserFilter, UserFlagsUpdate};
use crate::models::reference::{
    BookLinkType, ORPHAN_AUTHOR_ID, Reference, ReferenceFilter, ReferenceMetadata, StoredReference,
};
use crate::uuid::new_id;

type UserRow = (String, String, String, bool, bool, DateTime<Utc>);
type ReferenceRow = (String, Json<Reference>, DateTime<Utc>);

const USER_COLUMNS: &str =
    "internal_id, external_id_hash, username, is_author, requested_join, created_at";

fn user_from_row(row: UserRow) -> User {
    let (internal_id, external_id_hash, username, is_author, requested_join, created_at) = row;
    User {
        internal_id,
        external_id_hash,
        username,
        is_author,
        requested_join,
        created_at,
    }
}

fn reference_from_row(row: ReferenceRow) -> StoredReference {
    let (author_id, Json(reference), created_at) = row;
    StoredReference {
        reference,
        metadata: ReferenceMetadata {
            created_at,
            author_id,
        },
    }
}

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("connected to database");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        crate::migrate::migrate(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_external_id(&self, external_id_hash: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id_hash = $1"
        ))
        .bind(external_id_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_internal_id(&self, internal_id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE internal_id = $1"
        ))
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        // The unique constraint on external_id_hash settles concurrent
        // first logins; the loser reads the winner's row.
        sqlx::query(
            "INSERT INTO users (internal_id, external_id_hash, username) VALUES ($1, $2, $3) \
             ON CONFLICT (external_id_hash) DO NOTHING",
        )
        .bind(new_id())
        .bind(&new_user.external_id_hash)
        .bind(&new_user.username)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id_hash = $1"
        ))
        .bind(&new_user.external_id_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user_from_row(row))
    }

    async fn update_user_flags(&self, internal_id: &str, update: UserFlagsUpdate) -> StoreResult<bool> {
        if update.is_empty() {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE users SET \
               is_author = COALESCE($2, is_author), \
               requested_join = COALESCE($3, requested_join) \
             WHERE internal_id = $1 \
               AND (is_author IS DISTINCT FROM COALESCE($2, is_author) \
                 OR requested_join IS DISTINCT FROM COALESCE($3, requested_join))",
        )
        .bind(internal_id)
        .bind(update.is_author)
        .bind(update.requested_join)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, filter: UserFilter) -> StoreResult<Vec<User>> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        if let Some(v) = filter.requested_join.as_bool() {
            query.push(" AND requested_join = ").push_bind(v);
        }
        if let Some(v) = filter.is_author.as_bool() {
            query.push(" AND is_author = ").push_bind(v);
        }
        query.push(" ORDER BY created_at");
        let rows = query.build_query_as::<UserRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn delete_user(&self, internal_id: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE reference_documents SET author_id = $2 WHERE author_id = $1")
            .bind(internal_id)
            .bind(ORPHAN_AUTHOR_ID)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE internal_id = $1")
            .bind(internal_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn find_operator(&self, username: &str) -> StoreResult<Option<Operator>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT username, password_hash FROM operators WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(username, password_hash)| Operator {
            username,
            password_hash,
        }))
    }

    async fn upsert_operator(&self, operator: Operator) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO operators (username, password_hash) VALUES ($1, $2) \
             ON CONFLICT (username) DO UPDATE SET password_hash = EXCLUDED.password_hash",
        )
        .bind(&operator.username)
        .bind(&operator.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for PgStore {
    async fn insert_reference(&self, mut reference: Reference, author_id: &str) -> StoreResult<StoredReference> {
        let reference_id = new_id();
        reference.reference_id = Some(reference_id.clone());
        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO reference_documents (reference_id, author_id, document) \
             VALUES ($1, $2, $3) RETURNING created_at",
        )
        .bind(&reference_id)
        .bind(author_id)
        .bind(Json(&reference))
        .fetch_one(&self.pool)
        .await?;
        Ok(StoredReference {
            reference,
            metadata: ReferenceMetadata {
                created_at,
                author_id: author_id.to_string(),
            },
        })
    }

    async fn get_reference(&self, reference_id: &str) -> StoreResult<Option<StoredReference>> {
        let row = sqlx::query_as::<_, ReferenceRow>(
            "SELECT author_id, document, created_at FROM reference_documents WHERE reference_id = $1",
        )
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(reference_from_row))
    }

    async fn list_references(&self, filter: ReferenceFilter) -> StoreResult<Vec<StoredReference>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT author_id, document, created_at FROM reference_documents WHERE TRUE",
        );
        for (link_type, present) in filter.constraints() {
            let pattern = json!([{ "book_links": [{ "link_type": link_type.as_str() }] }]);
            query.push(if present { " AND " } else { " AND NOT " });
            query.push("(document -> 'books' @> ").push_bind(Json(pattern)).push(")");
        }
        query.push(" ORDER BY created_at");
        let rows = query
            .build_query_as::<ReferenceRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(reference_from_row).collect())
    }

    async fn list_references_by_author(&self, author_id: &str) -> StoreResult<Vec<StoredReference>> {
        let rows = sqlx::query_as::<_, ReferenceRow>(
            "SELECT author_id, document, created_at FROM reference_documents \
             WHERE author_id = $1 ORDER BY created_at",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(reference_from_row).collect())
    }

    async fn delete_reference(&self, reference_id: &str, author_id: &str) -> StoreResult<bool> {
        let deleted = sqlx::query(
            "DELETE FROM reference_documents WHERE reference_id = $1 AND author_id = $2",
        )
        .bind(reference_id)
        .bind(author_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted > 0)
    }

    async fn update_reference_link(
        &self,
        reference_id: &str,
        book_name: &str,
        link_type: BookLinkType,
        link_url: &str,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_scalar::<_, Json<Reference>>(
            "SELECT document FROM reference_documents WHERE reference_id = $1 FOR UPDATE",
        )
        .bind(reference_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(Json(mut reference)) = row else {
            return Ok(false);
        };
        if !reference.set_book_link(book_name, link_type, link_url) {
            return Ok(false);
        }
        sqlx::query("UPDATE reference_documents SET document = $2 WHERE reference_id = $1")
            .bind(reference_id)
            .bind(Json(&reference))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

/// Run against a real database:
/// `DATABASE_URL=postgres://... cargo test -p findsources_core -- --ignored`
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::FilterOption;
    use crate::models::reference::BookLink;
    use crate::models::reference::tests::sample_reference;

    async fn store() -> Option<PgStore> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        };
        let store = PgStore::connect(&url, 4).await.expect("connect to DATABASE_URL");
        store.migrate().await.expect("migrate");
        Some(store)
    }

    fn new_user() -> NewUser {
        NewUser {
            external_id_hash: format!("test-{}", new_id()),
            username: "Ada".into(),
        }
    }

    fn ids(references: &[StoredReference]) -> Vec<String> {
        references
            .iter()
            .filter_map(|r| r.reference.reference_id.clone())
            .collect()
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn create_user_rereads_existing_row_on_conflict() {
        let Some(store) = store().await else { return };
        let user = new_user();

        let first = store.create_user(user.clone()).await.unwrap();
        let second = store.create_user(user.clone()).await.unwrap();
        assert_eq!(first, second);

        let (a, b) = tokio::join!(
            store.create_user(new_user_with(&user)),
            store.create_user(new_user_with(&user)),
        );
        assert_eq!(a.unwrap().internal_id, first.internal_id);
        assert_eq!(b.unwrap().internal_id, first.internal_id);

        let found = store.find_user_by_external_id(&user.external_id_hash).await.unwrap();
        assert_eq!(found, Some(first));
    }

    fn new_user_with(user: &NewUser) -> NewUser {
        NewUser {
            external_id_hash: user.external_id_hash.clone(),
            username: "Someone else".into(),
        }
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn flag_update_reports_only_real_changes() {
        let Some(store) = store().await else { return };
        let user = store.create_user(new_user()).await.unwrap();
        let promote = UserFlagsUpdate {
            is_author: Some(true),
            requested_join: None,
        };

        assert!(store.update_user_flags(&user.internal_id, promote).await.unwrap());
        assert!(!store.update_user_flags(&user.internal_id, promote).await.unwrap());
        assert!(!store.update_user_flags("no-such-user", promote).await.unwrap());

        let authors = store
            .list_users(UserFilter {
                is_author: FilterOption::Yes,
                requested_join: FilterOption::Any,
            })
            .await
            .unwrap();
        assert!(authors.iter().any(|u| u.internal_id == user.internal_id));
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn link_filter_includes_and_excludes() {
        let Some(store) = store().await else { return };
        let author = new_id();

        let mut linked = sample_reference();
        linked.books[0].book_links.push(BookLink {
            link_type: BookLinkType::Amazon,
            link_url: "https://amazon.example/book".into(),
        });
        let linked = store.insert_reference(linked, &author).await.unwrap();
        let plain = store.insert_reference(sample_reference(), &author).await.unwrap();
        let linked_id = linked.reference.reference_id.clone().unwrap();
        let plain_id = plain.reference.reference_id.clone().unwrap();

        let with_amazon = ids(&store
            .list_references(ReferenceFilter {
                has_amazon_links: FilterOption::Yes,
                ..Default::default()
            })
            .await
            .unwrap());
        assert!(with_amazon.contains(&linked_id));
        assert!(!with_amazon.contains(&plain_id));

        let without_amazon = ids(&store
            .list_references(ReferenceFilter {
                has_amazon_links: FilterOption::No,
                ..Default::default()
            })
            .await
            .unwrap());
        assert!(without_amazon.contains(&plain_id));
        assert!(!without_amazon.contains(&linked_id));

        let mine = ids(&store.list_references_by_author(&author).await.unwrap());
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn link_update_adds_then_removes() {
        let Some(store) = store().await else { return };
        let stored = store.insert_reference(sample_reference(), &new_id()).await.unwrap();
        let id = stored.reference.reference_id.unwrap();
        let book = "Byzantium: The Decline";
        let url = "https://waterstones.example/book";

        assert!(store.update_reference_link(&id, book, BookLinkType::Waterstones, url).await.unwrap());
        assert!(!store.update_reference_link(&id, book, BookLinkType::Waterstones, url).await.unwrap());
        let reference = store.get_reference(&id).await.unwrap().unwrap().reference;
        assert!(reference.has_link(BookLinkType::Waterstones));

        assert!(store.update_reference_link(&id, book, BookLinkType::Waterstones, "").await.unwrap());
        let reference = store.get_reference(&id).await.unwrap().unwrap().reference;
        assert!(!reference.has_link(BookLinkType::Waterstones));
        assert!(!store.update_reference_link("missing", book, BookLinkType::Amazon, url).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn deleting_a_user_orphans_their_references() {
        let Some(store) = store().await else { return };
        let user = store.create_user(new_user()).await.unwrap();
        let stored = store.insert_reference(sample_reference(), &user.internal_id).await.unwrap();
        let id = stored.reference.reference_id.unwrap();

        assert!(store.delete_user(&user.internal_id).await.unwrap());
        assert_eq!(store.find_user_by_internal_id(&user.internal_id).await.unwrap(), None);
        let orphaned = store.get_reference(&id).await.unwrap().unwrap();
        assert_eq!(orphaned.metadata.author_id, ORPHAN_AUTHOR_ID);
        assert!(!store.delete_user(&user.internal_id).await.unwrap());
    }
}
