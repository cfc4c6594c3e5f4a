//! In-memory store
//!
//! Backs the local profile and the test suite. Honors the same contract as
//! any durable implementation: whole-record replace, read-your-writes,
//! no cross-record transactions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{Connection, OnboardingLink, OnboardingRequest, Owner, Platform};

use super::{ConnectionStore, RepairScope, StoreError};

#[derive(Default)]
struct Inner {
    connections: HashMap<Uuid, Connection>,
    links: HashMap<String, OnboardingLink>,
    requests: HashMap<String, OnboardingRequest>,
}

/// Shared in-memory implementation of [`ConnectionStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_oldest_first(mut rows: Vec<Connection>) -> Vec<Connection> {
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    rows
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn get_connection(
        &self,
        owner: &Owner,
        platform: Platform,
        platform_user_id: Option<&str>,
    ) -> Result<Option<Connection>, StoreError> {
        let inner = self.inner.read().await;
        let found = inner
            .connections
            .values()
            .filter(|c| &c.owner == owner && c.platform == platform)
            .filter(|c| match platform_user_id {
                Some(id) => c.platform_user_id == id,
                None => c.is_active,
            })
            .min_by_key(|c| (c.created_at, c.id))
            .cloned();
        Ok(found)
    }

    async fn get_connection_by_id(&self, id: Uuid) -> Result<Option<Connection>, StoreError> {
        Ok(self.inner.read().await.connections.get(&id).cloned())
    }

    async fn put_connection(&self, connection: Connection) -> Result<Connection, StoreError> {
        let mut inner = self.inner.write().await;
        inner.connections.insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn list_connections(&self, owner: &Owner) -> Result<Vec<Connection>, StoreError> {
        let inner = self.inner.read().await;
        let rows = inner
            .connections
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        Ok(sorted_oldest_first(rows))
    }

    async fn list_scope(&self, scope: &RepairScope) -> Result<Vec<Connection>, StoreError> {
        let inner = self.inner.read().await;
        let rows = inner
            .connections
            .values()
            .filter(|c| c.is_active)
            .filter(|c| match scope {
                RepairScope::All => true,
                RepairScope::Owner { owner } => &c.owner == owner,
                RepairScope::Platform { platform } => c.platform == *platform,
                RepairScope::Connection { id } => c.id == *id,
            })
            .cloned()
            .collect();
        Ok(sorted_oldest_first(rows))
    }

    async fn get_link(&self, token: &str) -> Result<Option<OnboardingLink>, StoreError> {
        Ok(self.inner.read().await.links.get(token).cloned())
    }

    async fn put_link(&self, link: OnboardingLink) -> Result<OnboardingLink, StoreError> {
        let mut inner = self.inner.write().await;
        inner.links.insert(link.token.clone(), link.clone());
        Ok(link)
    }

    async fn get_request(
        &self,
        link_token: &str,
    ) -> Result<Option<OnboardingRequest>, StoreError> {
        Ok(self.inner.read().await.requests.get(link_token).cloned())
    }

    async fn put_request(
        &self,
        request: OnboardingRequest,
    ) -> Result<OnboardingRequest, StoreError> {
        let mut inner = self.inner.write().await;
        inner.requests.insert(request.link_token.clone(), request.clone());
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenData;

    fn connection(owner: Owner, platform: Platform, user_id: &str, active: bool) -> Connection {
        let mut conn = Connection::from_grant(
            owner,
            platform,
            TokenData {
                access_token: "t".into(),
                refresh_token: None,
                expires_at: None,
                scopes: Default::default(),
                platform_user_id: user_id.into(),
                platform_username: "u".into(),
            },
            vec![],
        );
        conn.is_active = active;
        conn
    }

    #[tokio::test]
    async fn lookup_without_user_id_returns_only_active() {
        let store = MemoryStore::new();
        let owner = Owner::admin("a1");
        let stale = connection(owner.clone(), Platform::Meta, "old-user", false);
        let live = connection(owner.clone(), Platform::Meta, "new-user", true);
        store.put_connection(stale.clone()).await.unwrap();
        store.put_connection(live.clone()).await.unwrap();

        let found = store
            .get_connection(&owner, Platform::Meta, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.platform_user_id, "new-user");

        // Explicit user id still reaches the soft-deleted row.
        let found = store
            .get_connection(&owner, Platform::Meta, Some("old-user"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, stale.id);
    }

    #[tokio::test]
    async fn scope_listing_excludes_inactive() {
        let store = MemoryStore::new();
        store
            .put_connection(connection(Owner::client("c1"), Platform::Google, "g1", true))
            .await
            .unwrap();
        store
            .put_connection(connection(Owner::client("c2"), Platform::Google, "g2", false))
            .await
            .unwrap();

        let rows = store.list_scope(&RepairScope::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].platform_user_id, "g1");

        let rows = store
            .list_scope(&RepairScope::Owner {
                owner: Owner::client("c2"),
            })
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
