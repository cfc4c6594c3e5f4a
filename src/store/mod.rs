//! # Persistence Collaborator
//!
//! The engine treats storage as an opaque keyed service with read-your-writes
//! consistency and no multi-record transactions. Every connection update is a
//! single whole-record replace; there is nothing to see mid-update.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Connection, OnboardingLink, OnboardingRequest, Owner, Platform};

pub mod memory;

pub use memory::MemoryStore;

/// Errors surfaced by the persistence collaborator. Never swallowed; the
/// calling operation fails and reports.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
}

/// Which stored connections a repair batch targets.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RepairScope {
    /// Every active connection (all completed onboarding sessions plus
    /// admin self-connects).
    All,
    /// Active connections held by one owner.
    Owner { owner: Owner },
    /// Active connections for one platform.
    Platform { platform: Platform },
    /// One connection by id.
    Connection { id: Uuid },
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Look up by the idempotency key. With `platform_user_id = None`,
    /// returns the active connection for `(owner, platform)` if any.
    async fn get_connection(
        &self,
        owner: &Owner,
        platform: Platform,
        platform_user_id: Option<&str>,
    ) -> Result<Option<Connection>, StoreError>;

    async fn get_connection_by_id(&self, id: Uuid) -> Result<Option<Connection>, StoreError>;

    /// Whole-record insert-or-replace keyed by connection id.
    async fn put_connection(&self, connection: Connection) -> Result<Connection, StoreError>;

    /// All connections held by an owner, active or not, oldest first.
    async fn list_connections(&self, owner: &Owner) -> Result<Vec<Connection>, StoreError>;

    /// Active connections matched by a repair scope, oldest first.
    async fn list_scope(&self, scope: &RepairScope) -> Result<Vec<Connection>, StoreError>;

    async fn get_link(&self, token: &str) -> Result<Option<OnboardingLink>, StoreError>;

    async fn put_link(&self, link: OnboardingLink) -> Result<OnboardingLink, StoreError>;

    async fn get_request(&self, link_token: &str)
        -> Result<Option<OnboardingRequest>, StoreError>;

    async fn put_request(
        &self,
        request: OnboardingRequest,
    ) -> Result<OnboardingRequest, StoreError>;
}
