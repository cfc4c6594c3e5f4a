//! Connection reconciler
//!
//! `upsert` is the single idempotency boundary: persisted state is made to
//! match the latest grant and fetch, keyed by the stable platform user id.
//! `repair` re-runs asset fetch for stored connections and upserts the
//! result; it is safe to re-trigger at any time.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ConnectError;
use crate::model::{dedupe_assets, Asset, Connection, Owner, Platform, TokenData};
use crate::platforms::{AssetFetchFailure, PlatformRegistry};
use crate::store::{ConnectionStore, RepairScope};

/// Per-connection outcome of a repair batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairStatus {
    /// Fetch and upsert succeeded; per-asset-kind failures, if any, are
    /// listed but did not block the save.
    Repaired {
        assets: usize,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failures: Vec<AssetFetchFailure>,
    },
    /// Connection skipped (inactive, platform not registered, or gone).
    Skipped { reason: String },
    /// Fetch or persistence failed outright; stored state is untouched.
    Failed { detail: String },
    /// Cancellation arrived before this connection's fetch started.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub connection_id: Uuid,
    #[serde(flatten)]
    pub status: RepairStatus,
}

/// Unordered set of per-connection outcomes. Partial completion under
/// cancellation is expected and reported, never a batch failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub outcomes: Vec<RepairOutcome>,
}

impl RepairReport {
    pub fn repaired(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RepairStatus::Repaired { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RepairStatus::Failed { .. }))
            .count()
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ConnectionStore>,
    registry: PlatformRegistry,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        registry: PlatformRegistry,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            registry,
            concurrency: concurrency.max(1),
        }
    }

    /// Idempotent upsert keyed by `(owner, platform, platform_user_id)`.
    ///
    /// Reconnecting the same identity replaces token fields and the asset
    /// set in place. Reconnecting the same owner and platform with a new
    /// identity supersedes the prior connection: the old record is
    /// deactivated, never merged into the new one.
    pub async fn upsert(
        &self,
        owner: Owner,
        platform: Platform,
        token: TokenData,
        assets: Vec<Asset>,
    ) -> Result<Connection, ConnectError> {
        let assets = dedupe_assets(assets);
        let current_active = self.store.get_connection(&owner, platform, None).await?;

        if let Some(mut existing) = self
            .store
            .get_connection(&owner, platform, Some(&token.platform_user_id))
            .await?
        {
            existing.apply_grant(token, assets);
            self.store.put_connection(existing.clone()).await?;
            // Reconnecting a previously superseded identity reactivates it,
            // so the identity that held the active slot steps down. At most
            // one connection per (owner, platform) is ever active.
            if let Some(mut other) = current_active {
                if other.id != existing.id {
                    other.deactivate();
                    self.store.put_connection(other.clone()).await?;
                    info!(
                        superseded = %other.id,
                        %owner,
                        platform = %platform,
                        "prior connection superseded by reactivated identity"
                    );
                }
            }
            debug!(connection_id = %existing.id, %owner, platform = %platform, "connection updated in place");
            return Ok(existing);
        }

        if let Some(mut prior) = current_active {
            if prior.platform_user_id != token.platform_user_id {
                prior.deactivate();
                self.store.put_connection(prior.clone()).await?;
                info!(
                    superseded = %prior.id,
                    %owner,
                    platform = %platform,
                    "prior connection superseded by new external identity"
                );
            }
        }

        let connection = Connection::from_grant(owner, platform, token, assets);
        self.store.put_connection(connection.clone()).await?;
        Ok(connection)
    }

    /// Re-run asset fetch and upsert for every active connection in scope,
    /// with bounded concurrency. The call only fails when the scope itself
    /// cannot be enumerated.
    pub async fn repair(
        &self,
        scope: RepairScope,
        cancel: CancellationToken,
    ) -> Result<RepairReport, ConnectError> {
        let targets = self.store.list_scope(&scope).await?;
        info!(targets = targets.len(), scope = ?scope, "repair batch starting");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(targets.len());

        for connection in targets {
            let connection_id = connection.id;

            // Cancellation stops scheduling new fetches; in-flight ones
            // run to completion or timeout.
            if cancel.is_cancelled() {
                handles.push((connection_id, None));
                continue;
            }

            let semaphore = semaphore.clone();
            let reconciler = self.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                // Tasks queued behind the semaphore re-check before
                // starting their fetch.
                if cancel.is_cancelled() {
                    return RepairStatus::Cancelled;
                }
                reconciler.repair_one(connection).await
            });
            handles.push((connection_id, Some(handle)));
        }

        let mut report = RepairReport::default();
        for (connection_id, handle) in handles {
            let status = match handle {
                None => RepairStatus::Cancelled,
                Some(handle) => match handle.await {
                    Ok(status) => status,
                    Err(err) => {
                        error!(connection_id = %connection_id, error = %err, "repair task panicked");
                        RepairStatus::Failed {
                            detail: format!("task failure: {}", err),
                        }
                    }
                },
            };
            match &status {
                RepairStatus::Repaired { .. } => {
                    counter!("repair_connections_repaired_total").increment(1)
                }
                RepairStatus::Failed { .. } => {
                    counter!("repair_connections_failed_total").increment(1)
                }
                _ => {}
            }
            report.outcomes.push(RepairOutcome {
                connection_id,
                status,
            });
        }

        info!(
            repaired = report.repaired(),
            failed = report.failed(),
            total = report.outcomes.len(),
            "repair batch finished"
        );
        Ok(report)
    }

    async fn repair_one(&self, connection: Connection) -> RepairStatus {
        if !connection.is_active {
            return RepairStatus::Skipped {
                reason: "connection inactive".to_string(),
            };
        }

        let adapter = match self.registry.get(connection.platform) {
            Ok(adapter) => adapter,
            Err(_) => {
                return RepairStatus::Skipped {
                    reason: format!("platform {} not registered", connection.platform),
                }
            }
        };

        let outcome = match adapter
            .fetch_assets(
                &connection.access_token,
                &connection.scopes,
                &connection.platform_user_id,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                return RepairStatus::Failed {
                    detail: err.to_string(),
                }
            }
        };

        let token = TokenData {
            access_token: connection.access_token.clone(),
            refresh_token: connection.refresh_token.clone(),
            expires_at: connection.expires_at,
            scopes: connection.scopes.clone(),
            platform_user_id: connection.platform_user_id.clone(),
            platform_username: connection.platform_username.clone(),
        };

        match self
            .upsert(
                connection.owner.clone(),
                connection.platform,
                token,
                outcome.assets,
            )
            .await
        {
            Ok(updated) => RepairStatus::Repaired {
                assets: updated.assets.len(),
                failures: outcome.failures,
            },
            Err(err) => RepairStatus::Failed {
                detail: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScopeSet;
    use crate::store::MemoryStore;

    fn token(user_id: &str) -> TokenData {
        TokenData {
            access_token: format!("token-{user_id}"),
            refresh_token: None,
            expires_at: None,
            scopes: ["pages_show_list"].into_iter().collect::<ScopeSet>(),
            platform_user_id: user_id.to_string(),
            platform_username: format!("user {user_id}"),
        }
    }

    fn reconciler(store: Arc<MemoryStore>) -> Reconciler {
        Reconciler::new(store, PlatformRegistry::new(), 4)
    }

    #[tokio::test]
    async fn upsert_twice_with_identical_input_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());
        let owner = Owner::admin("a1");
        let assets = vec![Asset::new(
            Platform::Meta,
            crate::model::AssetKind::Page,
            "p1",
            "Page",
        )];

        let first = reconciler
            .upsert(owner.clone(), Platform::Meta, token("u1"), assets.clone())
            .await
            .unwrap();
        let second = reconciler
            .upsert(owner.clone(), Platform::Meta, token("u1"), assets)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.assets, second.assets);

        let all = store.list_connections(&owner).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn new_identity_supersedes_prior_active_connection() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());
        let owner = Owner::admin("a1");

        let first = reconciler
            .upsert(owner.clone(), Platform::Meta, token("identity-a"), vec![])
            .await
            .unwrap();
        let second = reconciler
            .upsert(owner.clone(), Platform::Meta, token("identity-b"), vec![])
            .await
            .unwrap();

        assert_ne!(first.id, second.id);

        let stored_first = store.get_connection_by_id(first.id).await.unwrap().unwrap();
        assert!(!stored_first.is_active);
        let stored_second = store.get_connection_by_id(second.id).await.unwrap().unwrap();
        assert!(stored_second.is_active);

        // the superseded connection's assets were not merged
        assert!(stored_second.assets.is_empty());
    }

    #[tokio::test]
    async fn reconnecting_superseded_identity_keeps_one_active() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());
        let owner = Owner::admin("a1");

        let first = reconciler
            .upsert(owner.clone(), Platform::Meta, token("identity-a"), vec![])
            .await
            .unwrap();
        let second = reconciler
            .upsert(owner.clone(), Platform::Meta, token("identity-b"), vec![])
            .await
            .unwrap();
        // identity-a comes back, taking the active slot from identity-b
        let third = reconciler
            .upsert(owner.clone(), Platform::Meta, token("identity-a"), vec![])
            .await
            .unwrap();

        assert_eq!(third.id, first.id);
        assert!(third.is_active);
        let stored_second = store.get_connection_by_id(second.id).await.unwrap().unwrap();
        assert!(!stored_second.is_active);

        let active: Vec<_> = store
            .list_connections(&owner)
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].platform_user_id, "identity-a");
    }

    #[tokio::test]
    async fn upsert_dedupes_incoming_assets() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store);
        let owner = Owner::client("c1");
        let kind = crate::model::AssetKind::Page;
        let assets = vec![
            Asset::new(Platform::Meta, kind, "p1", "Page"),
            Asset::new(Platform::Meta, kind, "p1", "Page again"),
            Asset::new(Platform::Meta, kind, "p2", "Other"),
        ];

        let connection = reconciler
            .upsert(owner, Platform::Meta, token("u1"), assets)
            .await
            .unwrap();
        assert_eq!(connection.assets.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_batch_reports_unscheduled_connections() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());
        let owner = Owner::admin("a1");
        reconciler
            .upsert(owner.clone(), Platform::Meta, token("u1"), vec![])
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = reconciler
            .repair(RepairScope::Owner { owner }, cancel)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(report.outcomes[0].status, RepairStatus::Cancelled));
    }

    #[tokio::test]
    async fn mid_batch_cancellation_stops_queued_fetches() {
        use crate::platforms::MetaAdapter;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": [] }))
                    .set_delay(std::time::Duration::from_millis(1000)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "u" })),
            )
            .mount(&server)
            .await;

        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MetaAdapter::new(
            "id".to_string(),
            "secret".to_string(),
            server.uri(),
            server.uri(),
            5,
        )));

        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone(), registry, 1);
        let owner = Owner::admin("a1");
        for user_id in ["u1", "u2", "u3"] {
            store
                .put_connection(Connection::from_grant(
                    owner.clone(),
                    Platform::Meta,
                    token(user_id),
                    vec![],
                ))
                .await
                .unwrap();
        }

        let cancel = CancellationToken::new();
        let batch = tokio::spawn({
            let reconciler = reconciler.clone();
            let cancel = cancel.clone();
            async move { reconciler.repair(RepairScope::All, cancel).await }
        });

        // fire while the first fetch is still in flight
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();

        let report = batch.await.unwrap().unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.repaired(), 1, "in-flight fetch runs to completion");
        let cancelled = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, RepairStatus::Cancelled))
            .count();
        assert_eq!(cancelled, 2, "queued fetches never start");
    }

    #[tokio::test]
    async fn repair_skips_unregistered_platforms() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());
        let owner = Owner::admin("a1");
        reconciler
            .upsert(owner.clone(), Platform::Meta, token("u1"), vec![])
            .await
            .unwrap();

        let report = reconciler
            .repair(RepairScope::Owner { owner }, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(
            &report.outcomes[0].status,
            RepairStatus::Skipped { reason } if reason.contains("not registered")
        ));
    }
}
