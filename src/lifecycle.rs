//! Token lifecycle
//!
//! Tracks expiry, refreshes tokens ahead of their deadline where the
//! platform supports it, and runs the live-validity probe that soft-deletes
//! dead connections.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::error::ConnectError;
use crate::model::Connection;
use crate::platforms::PlatformRegistry;
use crate::store::ConnectionStore;

#[derive(Clone)]
pub struct Lifecycle {
    registry: PlatformRegistry,
    store: Arc<dyn ConnectionStore>,
    lead_time: Duration,
}

impl Lifecycle {
    pub fn new(
        registry: PlatformRegistry,
        store: Arc<dyn ConnectionStore>,
        lead_time_seconds: u64,
    ) -> Self {
        Self {
            registry,
            store,
            lead_time: Duration::seconds(lead_time_seconds as i64),
        }
    }

    /// True when the token expires within the configured lead time.
    /// Connections without an expiry (Shopify store access) are never stale.
    pub fn is_stale(&self, connection: &Connection) -> bool {
        connection.expires_within(Utc::now(), self.lead_time)
    }

    /// Refresh the token if it is stale and the connection carries a
    /// refresh token. Persists the refreshed record atomically. A stale
    /// connection without a refresh token is returned unchanged; the
    /// validity probe decides its fate.
    pub async fn ensure_fresh(&self, connection: Connection) -> Result<Connection, ConnectError> {
        if !self.is_stale(&connection) {
            return Ok(connection);
        }
        let Some(refresh_token) = connection.refresh_token.clone() else {
            debug!(connection_id = %connection.id, "stale token has no refresh token");
            return Ok(connection);
        };

        let adapter = self.registry.get(connection.platform)?;
        let mut token = adapter.refresh(&refresh_token).await?;
        if token.scopes.is_empty() {
            token.scopes = connection.scopes.clone();
        }

        let mut updated = connection;
        let assets = updated.assets.clone();
        updated.apply_grant(token, assets);
        self.store.put_connection(updated.clone()).await?;
        debug!(connection_id = %updated.id, "token refreshed");
        Ok(updated)
    }

    /// Run the platform's cheap live probe. On failure the connection is
    /// marked inactive but retained for audit and repair.
    pub async fn validate(&self, connection: Connection) -> Result<Connection, ConnectError> {
        let adapter = self.registry.get(connection.platform)?;
        if adapter.probe(&connection).await {
            return Ok(connection);
        }

        warn!(
            connection_id = %connection.id,
            platform = %connection.platform,
            "validity probe failed, deactivating connection"
        );
        let mut dead = connection;
        dead.deactivate();
        self.store.put_connection(dead.clone()).await?;
        Ok(dead)
    }
}
