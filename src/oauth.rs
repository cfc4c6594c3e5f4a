//! Authorization orchestrator
//!
//! Drives the authorization-code grant end to end: authorize-URL
//! construction with a stateless, unguessable state token; callback
//! consumption; code exchange; first asset fetch; and the idempotent
//! upsert. The client secret only ever travels server-side.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::ConnectError;
use crate::model::{Connection, OnboardingRequest, Owner, Platform, ScopeSet};
use crate::platforms::{shopify, AssetFetchFailure, ExchangeParams, PlatformRegistry};
use crate::reconciler::Reconciler;
use crate::store::{ConnectionStore, RepairScope};

/// Why a flow was started. Client flows carry the onboarding-link token so
/// the callback can resume without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPurpose {
    AdminConnect,
    ClientOnboarding,
}

/// Context encoded into the OAuth `state` parameter. Serialized as
/// base64url JSON with a 32-byte random nonce so the value is unguessable
/// and self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateToken {
    pub purpose: FlowPurpose,
    pub platform: Platform,
    pub owner: Owner,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_token: Option<String>,
    nonce: String,
}

impl StateToken {
    pub fn new(
        purpose: FlowPurpose,
        platform: Platform,
        owner: Owner,
        link_token: Option<String>,
    ) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        Self {
            purpose,
            platform,
            owner,
            link_token,
            nonce: base64_url::encode(&bytes),
        }
    }

    pub fn encode(&self) -> String {
        // serialization of a plain struct cannot fail
        base64_url::encode(&serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(raw: &str) -> Result<Self, ConnectError> {
        let bytes = base64_url::decode(raw)
            .map_err(|err| ConnectError::InvalidState(format!("not base64url: {}", err)))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ConnectError::InvalidState(format!("malformed payload: {}", err)))
    }
}

/// Query parameters a provider sends back to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a successful callback. The saved connection is the critical
/// path; onboarding-request enrichment is best effort and reports its
/// failure through its own channel instead of failing the flow.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub connection: Connection,
    pub state: StateToken,
    pub fetch_failures: Vec<AssetFetchFailure>,
    pub enrichment_error: Option<String>,
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: PlatformRegistry,
    reconciler: Reconciler,
    store: Arc<dyn ConnectionStore>,
    base_app_url: String,
}

impl Orchestrator {
    pub fn new(
        registry: PlatformRegistry,
        reconciler: Reconciler,
        store: Arc<dyn ConnectionStore>,
        base_app_url: String,
    ) -> Self {
        Self {
            registry,
            reconciler,
            store,
            base_app_url: base_app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Exact redirect URI registered with each provider. Providers compare
    /// this byte for byte, trailing slash included.
    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!("{}/callback/{}", self.base_app_url, platform.slug())
    }

    /// Scopes for a flow: explicit override, else the link's requested
    /// scopes for client flows, else the platform defaults.
    async fn flow_scopes(
        &self,
        platform: Platform,
        purpose: FlowPurpose,
        link_token: Option<&str>,
        explicit: Option<ScopeSet>,
    ) -> Result<ScopeSet, ConnectError> {
        if let Some(scopes) = explicit {
            return Ok(scopes);
        }
        if purpose == FlowPurpose::ClientOnboarding {
            if let Some(token) = link_token {
                let link = self.validated_link(token).await?;
                if let Some(scopes) = link.requested.get(&platform) {
                    if !scopes.is_empty() {
                        return Ok(scopes.clone());
                    }
                }
            }
        }
        let adapter = self.registry.get(platform)?;
        Ok(adapter.definition().default_scopes.into_iter().collect())
    }

    async fn validated_link(
        &self,
        token: &str,
    ) -> Result<crate::model::OnboardingLink, ConnectError> {
        let link = self
            .store
            .get_link(token)
            .await?
            .ok_or_else(|| ConnectError::LinkRejected("unknown link".to_string()))?;
        if link.is_expired(chrono::Utc::now()) {
            return Err(ConnectError::LinkRejected("link expired".to_string()));
        }
        Ok(link)
    }

    /// Build the authorize URL for a flow attempt. For client flows the
    /// onboarding link is validated first and must request this platform.
    pub async fn authorize_url(
        &self,
        platform: Platform,
        owner: Owner,
        purpose: FlowPurpose,
        link_token: Option<String>,
        scopes: Option<ScopeSet>,
    ) -> Result<Url, ConnectError> {
        if purpose == FlowPurpose::ClientOnboarding {
            let token = link_token
                .as_deref()
                .ok_or_else(|| ConnectError::LinkRejected("missing link token".to_string()))?;
            let link = self.validated_link(token).await?;
            if !link.requested.is_empty() && !link.requested.contains_key(&platform) {
                return Err(ConnectError::LinkRejected(format!(
                    "link does not request {}",
                    platform
                )));
            }
        }

        let adapter = self.registry.get(platform)?;
        let scopes = self
            .flow_scopes(platform, purpose, link_token.as_deref(), scopes)
            .await?;
        let state = StateToken::new(purpose, platform, owner, link_token).encode();
        adapter.authorize_url(&self.redirect_uri(platform), &scopes, &state)
    }

    /// Consume a provider callback. Denial short-circuits before any token
    /// endpoint call; exchange failure is terminal for the attempt. On
    /// success the first asset fetch runs before the connection is saved,
    /// so the persisted record already carries materialized assets.
    pub async fn handle_callback(
        &self,
        platform: Platform,
        query: CallbackQuery,
    ) -> Result<CallbackOutcome, ConnectError> {
        if let Some(error) = query.error {
            let reason = query.error_description.unwrap_or(error);
            return Err(ConnectError::OAuthDenied { reason });
        }

        let state_raw = query
            .state
            .ok_or_else(|| ConnectError::InvalidState("missing state".to_string()))?;
        let state = StateToken::decode(&state_raw)?;
        if state.platform != platform {
            return Err(ConnectError::InvalidState(format!(
                "state was issued for {}, callback is for {}",
                state.platform, platform
            )));
        }

        let code = query
            .code
            .ok_or_else(|| ConnectError::InvalidState("missing code".to_string()))?;

        let adapter = self.registry.get(platform)?;
        let requested_scopes = self
            .flow_scopes(platform, state.purpose, state.link_token.as_deref(), None)
            .await?;

        let token = adapter
            .exchange_code(ExchangeParams {
                code: &code,
                redirect_uri: &self.redirect_uri(platform),
                requested_scopes: &requested_scopes,
            })
            .await?;

        // First fetch. A wholesale fetch failure still saves the
        // connection, assetless, with the cause recorded; repair fills the
        // assets in later.
        let (assets, fetch_failures) = match adapter
            .fetch_assets(&token.access_token, &token.scopes, &token.platform_user_id)
            .await
        {
            Ok(outcome) => (outcome.assets, outcome.failures),
            Err(ConnectError::AssetFetchFailed {
                platform,
                kind,
                detail,
            }) => {
                warn!(platform = %platform, detail, "first asset fetch failed, saving connection without assets");
                (
                    Vec::new(),
                    vec![AssetFetchFailure {
                        platform,
                        kind,
                        detail,
                    }],
                )
            }
            Err(other) => return Err(other),
        };

        let connection = self
            .reconciler
            .upsert(state.owner.clone(), platform, token, assets)
            .await?;

        info!(
            connection_id = %connection.id,
            platform = %platform,
            owner = %state.owner,
            assets = connection.assets.len(),
            "connection established"
        );

        let enrichment_error = match (&state.purpose, &state.link_token) {
            (FlowPurpose::ClientOnboarding, Some(link_token)) => self
                .attach_to_request(link_token, &connection)
                .await
                .err()
                .map(|err| err.to_string()),
            _ => None,
        };
        if let Some(detail) = &enrichment_error {
            warn!(detail, "onboarding request enrichment failed");
        }

        Ok(CallbackOutcome {
            connection,
            state,
            fetch_failures,
            enrichment_error,
        })
    }

    /// Best-effort secondary step: record the connection on the onboarding
    /// request aggregate. Callers treat failure as non-fatal.
    async fn attach_to_request(
        &self,
        link_token: &str,
        connection: &Connection,
    ) -> Result<(), ConnectError> {
        let mut request = match self.store.get_request(link_token).await? {
            Some(request) => request,
            None => {
                let link = self.validated_link(link_token).await?;
                OnboardingRequest::for_link(&link)
            }
        };
        request.attach_connection(connection.id);
        self.store.put_request(request).await?;
        Ok(())
    }

    /// Manual Shopify connection: store domain plus collaborator code,
    /// validated by shape and by uniqueness among active connections.
    pub async fn connect_store(
        &self,
        owner: Owner,
        store_domain: &str,
        collaborator_code: &str,
    ) -> Result<Connection, ConnectError> {
        let token = shopify::store_grant(store_domain, collaborator_code)?;

        let active = self
            .store
            .list_scope(&RepairScope::Platform {
                platform: Platform::Shopify,
            })
            .await?;
        if active.iter().any(|conn| {
            conn.platform_user_id == token.platform_user_id && conn.owner != owner
        }) {
            return Err(ConnectError::Validation(format!(
                "store {} is already connected",
                token.platform_user_id
            )));
        }

        let adapter = self.registry.get(Platform::Shopify)?;
        let outcome = adapter
            .fetch_assets(&token.access_token, &token.scopes, &token.platform_user_id)
            .await?;

        self.reconciler
            .upsert(owner, Platform::Shopify, token, outcome.assets)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetKind;
    use crate::store::{ConnectionStore, MemoryStore};
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator_with(registry: PlatformRegistry) -> (Orchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone(), registry.clone(), 4);
        (
            Orchestrator::new(
                registry,
                reconciler,
                store.clone(),
                "https://app.local/".to_string(),
            ),
            store,
        )
    }

    fn meta_registry(base: &str) -> PlatformRegistry {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(crate::platforms::MetaAdapter::new(
            "id".to_string(),
            "secret".to_string(),
            base.to_string(),
            base.to_string(),
            5,
        )));
        registry
    }

    #[test]
    fn state_token_roundtrip_and_uniqueness() {
        let token = StateToken::new(
            FlowPurpose::ClientOnboarding,
            Platform::Meta,
            Owner::client("c1"),
            Some("link-1".to_string()),
        );
        let decoded = StateToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded, token);

        let other = StateToken::new(
            FlowPurpose::ClientOnboarding,
            Platform::Meta,
            Owner::client("c1"),
            Some("link-1".to_string()),
        );
        assert_ne!(token.encode(), other.encode());
    }

    #[test]
    fn redirect_uri_has_no_double_slash() {
        let (orchestrator, _) = orchestrator_with(PlatformRegistry::new());
        assert_eq!(
            orchestrator.redirect_uri(Platform::Meta),
            "https://app.local/callback/meta"
        );
    }

    #[tokio::test]
    async fn denial_never_reaches_the_token_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v19.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator_with(meta_registry(&server.uri()));
        let state = StateToken::new(
            FlowPurpose::AdminConnect,
            Platform::Meta,
            Owner::admin("a1"),
            None,
        );
        let err = orchestrator
            .handle_callback(
                Platform::Meta,
                CallbackQuery {
                    error: Some("access_denied".to_string()),
                    state: Some(state.encode()),
                    ..CallbackQuery::default()
                },
            )
            .await
            .unwrap_err();

        match err {
            ConnectError::OAuthDenied { reason } => assert_eq!(reason, "access_denied"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn callback_exchanges_fetches_and_persists_in_one_pass() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v19.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "meta-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-9",
                "name": "Casey",
                "accounts": { "data": [ { "id": "page-1", "name": "Page", "category": "Page" } ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "permission": "pages_show_list", "status": "granted" } ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "id": "page-1", "name": "Page", "category": "Page" } ]
            })))
            .mount(&server)
            .await;

        let (orchestrator, store) = orchestrator_with(meta_registry(&server.uri()));
        let state = StateToken::new(
            FlowPurpose::AdminConnect,
            Platform::Meta,
            Owner::admin("a1"),
            None,
        );
        let outcome = orchestrator
            .handle_callback(
                Platform::Meta,
                CallbackQuery {
                    code: Some("one-time".to_string()),
                    state: Some(state.encode()),
                    ..CallbackQuery::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.fetch_failures.is_empty());
        assert_eq!(outcome.connection.platform_user_id, "user-9");
        assert_eq!(outcome.connection.assets.len(), 1);
        assert_eq!(outcome.connection.assets[0].kind, AssetKind::Page);

        let stored = store
            .get_connection(&Owner::admin("a1"), Platform::Meta, Some("user-9"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, outcome.connection.id);
        assert_eq!(stored.assets.len(), 1);
    }

    #[tokio::test]
    async fn client_callback_attaches_connection_to_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v19.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "meta-token"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-9", "name": "Casey", "accounts": { "data": [] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&server)
            .await;

        let (orchestrator, store) = orchestrator_with(meta_registry(&server.uri()));
        let link = crate::model::OnboardingLink {
            token: "link-1".to_string(),
            client_name: "Acme".to_string(),
            requested: BTreeMap::from([(
                Platform::Meta,
                ["pages_show_list"].into_iter().collect(),
            )]),
            expires_at: chrono::Utc::now() + chrono::Duration::days(1),
        };
        store.put_link(link).await.unwrap();

        let state = StateToken::new(
            FlowPurpose::ClientOnboarding,
            Platform::Meta,
            Owner::client("acme"),
            Some("link-1".to_string()),
        );
        let outcome = orchestrator
            .handle_callback(
                Platform::Meta,
                CallbackQuery {
                    code: Some("one-time".to_string()),
                    state: Some(state.encode()),
                    ..CallbackQuery::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.enrichment_error.is_none());
        let request = store.get_request("link-1").await.unwrap().unwrap();
        assert_eq!(request.connection_ids, vec![outcome.connection.id]);
    }

    #[tokio::test]
    async fn expired_link_is_rejected_before_redirecting() {
        let (orchestrator, store) = orchestrator_with(PlatformRegistry::new());
        store
            .put_link(crate::model::OnboardingLink {
                token: "old".to_string(),
                client_name: "Acme".to_string(),
                requested: BTreeMap::new(),
                expires_at: chrono::Utc::now() - chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let err = orchestrator
            .authorize_url(
                Platform::Meta,
                Owner::client("acme"),
                FlowPurpose::ClientOnboarding,
                Some("old".to_string()),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::LinkRejected(_)));
    }

    #[tokio::test]
    async fn connect_store_rejects_a_domain_held_by_another_owner() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(crate::platforms::ShopifyAdapter::new()));
        let (orchestrator, _) = orchestrator_with(registry);

        orchestrator
            .connect_store(Owner::client("c1"), "shop-a.myshopify.com", "code-1234")
            .await
            .unwrap();

        let err = orchestrator
            .connect_store(Owner::client("c2"), "shop-a.myshopify.com", "code-9999")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Validation(_)));

        // same owner reconnecting is an idempotent update, not a conflict
        let again = orchestrator
            .connect_store(Owner::client("c1"), "shop-a.myshopify.com", "code-5678")
            .await
            .unwrap();
        assert_eq!(again.access_token, "code-5678");
        assert_eq!(again.assets.len(), 1);
        assert_eq!(again.assets[0].kind, AssetKind::Store);
    }
}
