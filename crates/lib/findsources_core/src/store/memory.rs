//! In-memory store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CredentialStore, ReferenceStore, StoreResult};
use crate::models::auth::{NewUser, Operator, User, UserFilter, UserFlagsUpdate};
use crate::models::reference::{
    BookLinkType, ORPHAN_AUTHOR_ID, Reference, ReferenceFilter, ReferenceMetadata, StoredReference,
};
use crate::uuid::new_id;

#[derive(Debug, Default)]
struct Users {
    by_id: HashMap<String, User>,
    /// external id hash → internal id
    by_external: HashMap<String, String>,
}

/// Store backed by process memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Users>,
    operators: RwLock<HashMap<String, Operator>>,
    references: RwLock<HashMap<String, StoredReference>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.by_id.len()
    }
}

fn sorted_by_creation(mut refs: Vec<StoredReference>) -> Vec<StoredReference> {
    refs.sort_by(|a, b| a.metadata.created_at.cmp(&b.metadata.created_at));
    refs
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_external_id(&self, external_id_hash: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .by_external
            .get(external_id_hash)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_user_by_internal_id(&self, internal_id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.by_id.get(internal_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if let Some(existing) = users
            .by_external
            .get(&new_user.external_id_hash)
            .and_then(|id| users.by_id.get(id))
        {
            return Ok(existing.clone());
        }
        let user = User {
            internal_id: new_id(),
            external_id_hash: new_user.external_id_hash,
            username: new_user.username,
            is_author: false,
            requested_join: false,
            created_at: Utc::now(),
        };
        users
            .by_external
            .insert(user.external_id_hash.clone(), user.internal_id.clone());
        users.by_id.insert(user.internal_id.clone(), user.clone());
        Ok(user)
    }

    async fn update_user_flags(&self, internal_id: &str, update: UserFlagsUpdate) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        Ok(users
            .by_id
            .get_mut(internal_id)
            .is_some_and(|user| update.apply(user)))
    }

    async fn list_users(&self, filter: UserFilter) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        let mut list: Vec<User> = users
            .by_id
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn delete_user(&self, internal_id: &str) -> StoreResult<bool> {
        // Lock order: references, then users.
        let mut references = self.references.write().await;
        let mut users = self.users.write().await;
        let Some(user) = users.by_id.remove(internal_id) else {
            return Ok(false);
        };
        users.by_external.remove(&user.external_id_hash);
        for stored in references.values_mut() {
            if stored.metadata.author_id == internal_id {
                stored.metadata.author_id = ORPHAN_AUTHOR_ID.to_string();
            }
        }
        Ok(true)
    }

    async fn find_operator(&self, username: &str) -> StoreResult<Option<Operator>> {
        Ok(self.operators.read().await.get(username).cloned())
    }

    async fn upsert_operator(&self, operator: Operator) -> StoreResult<()> {
        self.operators
            .write()
            .await
            .insert(operator.username.clone(), operator);
        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn insert_reference(&self, mut reference: Reference, author_id: &str) -> StoreResult<StoredReference> {
        let reference_id = new_id();
        reference.reference_id = Some(reference_id.clone());
        let stored = StoredReference {
            reference,
            metadata: ReferenceMetadata {
                created_at: Utc::now(),
                author_id: author_id.to_string(),
            },
        };
        self.references
            .write()
            .await
            .insert(reference_id, stored.clone());
        Ok(stored)
    }

    async fn get_reference(&self, reference_id: &str) -> StoreResult<Option<StoredReference>> {
        Ok(self.references.read().await.get(reference_id).cloned())
    }

    async fn list_references(&self, filter: ReferenceFilter) -> StoreResult<Vec<StoredReference>> {
        let references = self.references.read().await;
        Ok(sorted_by_creation(
            references
                .values()
                .filter(|s| filter.matches(&s.reference))
                .cloned()
                .collect(),
        ))
    }

    async fn list_references_by_author(&self, author_id: &str) -> StoreResult<Vec<StoredReference>> {
        let references = self.references.read().await;
        Ok(sorted_by_creation(
            references
                .values()
                .filter(|s| s.metadata.author_id == author_id)
                .cloned()
                .collect(),
        ))
    }

    async fn delete_reference(&self, reference_id: &str, author_id: &str) -> StoreResult<bool> {
        let mut references = self.references.write().await;
        match references.get(reference_id) {
            Some(stored) if stored.metadata.author_id == author_id => {
                references.remove(reference_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_reference_link(
        &self,
        reference_id: &str,
        book_name: &str,
        link_type: BookLinkType,
        link_url: &str,
    ) -> StoreResult<bool> {
        let mut references = self.references.write().await;
        Ok(references
            .get_mut(reference_id)
            .is_some_and(|s| s.reference.set_book_link(book_name, link_type, link_url)))
    }
}
