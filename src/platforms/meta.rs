//! Meta (Facebook) integration
//!
//! Graph API adapter. Pages are listed through two overlapping edges
//! (`/me/accounts` and the `accounts{}` field on `/me`) and deduplicated
//! by identity triple before being returned.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::adapter::{
    http_client, truncate_body, ExchangeParams, FetchOutcome, PlatformAdapter, PlatformDefinition,
};
use crate::error::ConnectError;
use crate::model::{dedupe_assets, Asset, AssetKind, Connection, Platform, ScopeSet, TokenData};

const GRAPH_VERSION: &str = "v19.0";

const SCOPE_PAGES: &str = "pages_show_list";
const SCOPE_ADS_READ: &str = "ads_read";
const SCOPE_ADS_MANAGEMENT: &str = "ads_management";
const SCOPE_BUSINESS: &str = "business_management";
const SCOPE_CATALOG: &str = "catalog_management";
const SCOPE_INSTAGRAM: &str = "instagram_basic";

/// Category labels Graph has been observed to use for page objects.
/// Matching happens on the normalized form; raw labels vary in case and
/// separator across API versions.
const PAGE_CATEGORY_LABELS: &[&str] = &[
    "page",
    "facebook_page",
    "community",
    "business",
    "local_business",
    "brand",
    "company",
];

fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

fn is_known_page_category(raw: &str) -> bool {
    PAGE_CATEGORY_LABELS.contains(&normalize_category(raw).as_str())
}

pub struct MetaAdapter {
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    http: reqwest::Client,
}

impl MetaAdapter {
    pub fn new(
        client_id: String,
        client_secret: String,
        oauth_base: String,
        api_base: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            oauth_base,
            api_base,
            http: http_client(timeout_secs),
        }
    }

    fn graph(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, GRAPH_VERSION, path)
    }

    /// scopes actually granted, read back from `/me/permissions`. Falls back
    /// to the requested set when the permissions edge is unavailable.
    async fn granted_scopes(&self, access_token: &str, requested: &ScopeSet) -> ScopeSet {
        #[derive(Deserialize)]
        struct PermissionsResponse {
            data: Vec<PermissionEntry>,
        }
        #[derive(Deserialize)]
        struct PermissionEntry {
            permission: String,
            status: String,
        }

        let result = self
            .http
            .get(self.graph("me/permissions"))
            .bearer_auth(access_token)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<PermissionsResponse>().await {
                    Ok(body) => body
                        .data
                        .into_iter()
                        .filter(|entry| entry.status == "granted")
                        .map(|entry| entry.permission)
                        .collect(),
                    Err(err) => {
                        debug!(error = %err, "malformed permissions response, using requested scopes");
                        requested.clone()
                    }
                }
            }
            _ => {
                debug!("permissions edge unavailable, using requested scopes");
                requested.clone()
            }
        }
    }

    async fn fetch_pages_direct(&self, access_token: &str) -> Result<Vec<GraphPage>, String> {
        #[derive(Deserialize)]
        struct AccountsResponse {
            #[serde(default)]
            data: Vec<GraphPage>,
        }

        let response = self
            .http
            .get(self.graph("me/accounts"))
            .query(&[(
                "fields",
                "id,name,category,instagram_business_account{id,username}",
            )])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, truncate_body(&body)));
        }

        let body: AccountsResponse = response.json().await.map_err(|err| err.to_string())?;
        Ok(body.data)
    }

    async fn fetch_pages_field_edge(&self, access_token: &str) -> Result<Vec<GraphPage>, String> {
        #[derive(Deserialize)]
        struct MeResponse {
            accounts: Option<AccountsEdge>,
        }
        #[derive(Deserialize)]
        struct AccountsEdge {
            #[serde(default)]
            data: Vec<GraphPage>,
        }

        let response = self
            .http
            .get(self.graph("me"))
            .query(&[(
                "fields",
                "accounts{id,name,category,instagram_business_account{id,username}}",
            )])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, truncate_body(&body)));
        }

        let body: MeResponse = response.json().await.map_err(|err| err.to_string())?;
        Ok(body.accounts.map(|edge| edge.data).unwrap_or_default())
    }

    async fn fetch_ad_accounts(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        struct AdAccountsResponse {
            #[serde(default)]
            data: Vec<GraphAdAccount>,
        }
        #[derive(Deserialize)]
        struct GraphAdAccount {
            id: String,
            name: Option<String>,
            account_status: Option<i64>,
        }

        let response = self
            .http
            .get(self.graph("me/adaccounts"))
            .query(&[("fields", "id,name,account_status")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, truncate_body(&body)));
        }

        let body: AdAccountsResponse = response.json().await.map_err(|err| err.to_string())?;
        Ok(body
            .data
            .into_iter()
            .map(|account| {
                let name = account.name.clone().unwrap_or_else(|| account.id.clone());
                let mut asset = Asset::new(Platform::Meta, AssetKind::AdAccount, account.id, name);
                if let Some(status) = account.account_status {
                    asset = asset.with_metadata(json!({ "account_status": status }));
                }
                asset
            })
            .collect())
    }

    async fn fetch_businesses(
        &self,
        access_token: &str,
        include_catalogs: bool,
    ) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        struct BusinessesResponse {
            #[serde(default)]
            data: Vec<GraphBusiness>,
        }
        #[derive(Deserialize)]
        struct GraphBusiness {
            id: String,
            name: Option<String>,
            owned_product_catalogs: Option<CatalogsEdge>,
        }
        #[derive(Deserialize)]
        struct CatalogsEdge {
            #[serde(default)]
            data: Vec<GraphCatalog>,
        }
        #[derive(Deserialize)]
        struct GraphCatalog {
            id: String,
            name: Option<String>,
        }

        let response = self
            .http
            .get(self.graph("me/businesses"))
            .query(&[("fields", "id,name,owned_product_catalogs{id,name}")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, truncate_body(&body)));
        }

        let body: BusinessesResponse = response.json().await.map_err(|err| err.to_string())?;
        let mut assets = Vec::new();
        for business in body.data {
            let name = business.name.clone().unwrap_or_else(|| business.id.clone());
            assets.push(Asset::new(
                Platform::Meta,
                AssetKind::Business,
                business.id.clone(),
                name,
            ));
            if include_catalogs {
                for catalog in business
                    .owned_product_catalogs
                    .map(|edge| edge.data)
                    .unwrap_or_default()
                {
                    let catalog_name = catalog.name.unwrap_or_else(|| catalog.id.clone());
                    assets.push(
                        Asset::new(Platform::Meta, AssetKind::Catalog, catalog.id, catalog_name)
                            .with_metadata(json!({ "business_id": business.id })),
                    );
                }
            }
        }
        Ok(assets)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GraphPage {
    id: String,
    name: Option<String>,
    category: Option<String>,
    instagram_business_account: Option<GraphInstagramAccount>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphInstagramAccount {
    id: String,
    username: Option<String>,
}

/// Map one page-edge entry to assets. Unrecognized categories still map to
/// pages (the accounts edges only list pages) but are logged for review.
fn page_assets(page: GraphPage, instagram_granted: bool) -> Vec<Asset> {
    let mut assets = Vec::new();

    if let Some(category) = page.category.as_deref() {
        if !is_known_page_category(category) {
            debug!(category, page_id = %page.id, "unrecognized page category label");
        }
    }

    let name = page.name.clone().unwrap_or_else(|| page.id.clone());
    let mut asset = Asset::new(Platform::Meta, AssetKind::Page, page.id, name);
    if let Some(category) = page.category {
        asset = asset.with_metadata(json!({ "category": normalize_category(&category) }));
    }
    assets.push(asset);

    if instagram_granted {
        if let Some(instagram) = page.instagram_business_account {
            let username = instagram.username.unwrap_or_else(|| instagram.id.clone());
            assets.push(Asset::new(
                Platform::Meta,
                AssetKind::InstagramAccount,
                instagram.id,
                username,
            ));
        }
    }

    assets
}

#[derive(Deserialize)]
struct MetaTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[async_trait]
impl PlatformAdapter for MetaAdapter {
    fn definition(&self) -> PlatformDefinition {
        PlatformDefinition {
            platform: Platform::Meta,
            display_name: "Meta",
            default_scopes: vec![
                "public_profile".to_string(),
                SCOPE_PAGES.to_string(),
                SCOPE_ADS_READ.to_string(),
                SCOPE_BUSINESS.to_string(),
                SCOPE_CATALOG.to_string(),
                SCOPE_INSTAGRAM.to_string(),
            ],
            authorize_url: format!("{}/{}/dialog/oauth", self.oauth_base, GRAPH_VERSION),
            token_url: self.graph("oauth/access_token"),
            manual: false,
        }
    }

    fn authorize_url(
        &self,
        redirect_uri: &str,
        scopes: &ScopeSet,
        state: &str,
    ) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&self.definition().authorize_url)
            .map_err(|err| ConnectError::Validation(format!("bad authorize base: {}", err)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &scopes.join(","))
            .append_pair("response_type", "code");
        Ok(url)
    }

    async fn exchange_code(&self, params: ExchangeParams<'_>) -> Result<TokenData, ConnectError> {
        let mut form = HashMap::new();
        form.insert("client_id", self.client_id.clone());
        form.insert("client_secret", self.client_secret.clone());
        form.insert("redirect_uri", params.redirect_uri.to_string());
        form.insert("code", params.code.to_string());

        let response = self
            .http
            .post(self.graph("oauth/access_token"))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|err| ConnectError::TokenExchangeFailed {
                platform: Platform::Meta,
                detail: err.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::TokenExchangeFailed {
                platform: Platform::Meta,
                detail: format!("{}: {}", status, truncate_body(&body)),
            });
        }

        let token: MetaTokenResponse =
            response
                .json()
                .await
                .map_err(|err| ConnectError::TokenExchangeFailed {
                    platform: Platform::Meta,
                    detail: format!("malformed token response: {}", err),
                })?;

        // The stable user id is required to key the connection; failing to
        // resolve it fails the whole exchange.
        #[derive(Deserialize)]
        struct MeResponse {
            id: String,
            name: Option<String>,
        }

        let me_response = self
            .http
            .get(self.graph("me"))
            .query(&[("fields", "id,name")])
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|err| ConnectError::TokenExchangeFailed {
                platform: Platform::Meta,
                detail: format!("identity lookup failed: {}", err),
            })?;

        if !me_response.status().is_success() {
            let status = me_response.status();
            return Err(ConnectError::TokenExchangeFailed {
                platform: Platform::Meta,
                detail: format!("identity lookup failed: {}", status),
            });
        }

        let me: MeResponse =
            me_response
                .json()
                .await
                .map_err(|err| ConnectError::TokenExchangeFailed {
                    platform: Platform::Meta,
                    detail: format!("malformed identity response: {}", err),
                })?;

        let scopes = self
            .granted_scopes(&token.access_token, params.requested_scopes)
            .await;

        Ok(TokenData {
            expires_at: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            access_token: token.access_token,
            refresh_token: None,
            scopes,
            platform_username: me.name.unwrap_or_else(|| me.id.clone()),
            platform_user_id: me.id,
        })
    }

    async fn fetch_assets(
        &self,
        access_token: &str,
        scopes: &ScopeSet,
        _platform_user_id: &str,
    ) -> Result<FetchOutcome, ConnectError> {
        let mut outcome = FetchOutcome::default();
        let mut attempted = 0usize;
        let instagram_granted = scopes.contains(SCOPE_INSTAGRAM);

        if scopes.contains_any(&[SCOPE_PAGES, "public_profile"]) {
            attempted += 1;
            match self.fetch_pages_direct(access_token).await {
                Ok(pages) => {
                    for page in pages {
                        outcome.assets.extend(page_assets(page, instagram_granted));
                    }
                }
                Err(detail) => {
                    outcome.record_failure(Platform::Meta, Some(AssetKind::Page), detail)
                }
            }

            attempted += 1;
            match self.fetch_pages_field_edge(access_token).await {
                Ok(pages) => {
                    for page in pages {
                        outcome.assets.extend(page_assets(page, instagram_granted));
                    }
                }
                Err(detail) => {
                    outcome.record_failure(Platform::Meta, Some(AssetKind::Page), detail)
                }
            }
        }

        if scopes.contains_any(&[SCOPE_ADS_READ, SCOPE_ADS_MANAGEMENT]) {
            attempted += 1;
            match self.fetch_ad_accounts(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => {
                    outcome.record_failure(Platform::Meta, Some(AssetKind::AdAccount), detail)
                }
            }
        }

        if scopes.contains_any(&[SCOPE_BUSINESS, SCOPE_CATALOG]) {
            attempted += 1;
            match self
                .fetch_businesses(access_token, scopes.contains(SCOPE_CATALOG))
                .await
            {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => {
                    outcome.record_failure(Platform::Meta, Some(AssetKind::Business), detail)
                }
            }
        }

        if attempted > 0 && outcome.failures.len() == attempted {
            return Err(ConnectError::AssetFetchFailed {
                platform: Platform::Meta,
                kind: None,
                detail: format!(
                    "all asset surfaces failed: {}",
                    outcome
                        .failures
                        .iter()
                        .map(|f| f.detail.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
            });
        }

        outcome.assets = dedupe_assets(outcome.assets);
        Ok(outcome)
    }

    async fn probe(&self, connection: &Connection) -> bool {
        let result = self
            .http
            .get(self.graph("me/accounts"))
            .query(&[("limit", "1")])
            .bearer_auth(&connection.access_token)
            .send()
            .await;
        matches!(result, Ok(response) if response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param_contains};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> MetaAdapter {
        MetaAdapter::new(
            "test_client_id".to_string(),
            "test_client_secret".to_string(),
            base.to_string(),
            base.to_string(),
            5,
        )
    }

    fn scopes(values: &[&str]) -> ScopeSet {
        values.iter().copied().collect()
    }

    #[test]
    fn authorize_url_carries_scope_and_state() {
        let adapter = adapter("https://www.facebook.com");
        let requested = scopes(&["pages_show_list", "ads_read"]);
        let url = adapter
            .authorize_url("https://app.local/callback/meta", &requested, "state-1")
            .unwrap();

        assert_eq!(url.host_str().unwrap(), "www.facebook.com");
        assert_eq!(url.path(), "/v19.0/dialog/oauth");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs.get("client_id").unwrap(), "test_client_id");
        assert_eq!(pairs.get("scope").unwrap(), "pages_show_list,ads_read");
        assert_eq!(pairs.get("state").unwrap(), "state-1");
        assert_eq!(pairs.get("response_type").unwrap(), "code");
    }

    #[test]
    fn category_normalization_matches_label_variants() {
        assert!(is_known_page_category("Page"));
        assert!(is_known_page_category("FACEBOOK_PAGE"));
        assert!(is_known_page_category("Local Business"));
        assert!(!is_known_page_category("Musician/Band"));
    }

    #[tokio::test]
    async fn exchange_code_resolves_identity_and_granted_scopes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v19.0/oauth/access_token"))
            .and(body_string_contains("client_secret=test_client_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "meta-token",
                "token_type": "bearer",
                "expires_in": 5_184_000
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-77",
                "name": "Test Person"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "permission": "pages_show_list", "status": "granted" },
                    { "permission": "ads_read", "status": "declined" }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let requested = scopes(&["pages_show_list", "ads_read"]);
        let token = adapter
            .exchange_code(ExchangeParams {
                code: "one-time-code",
                redirect_uri: "https://app.local/callback/meta",
                requested_scopes: &requested,
            })
            .await
            .unwrap();

        assert_eq!(token.platform_user_id, "user-77");
        assert_eq!(token.platform_username, "Test Person");
        assert!(token.expires_at.is_some());
        assert!(token.scopes.contains("pages_show_list"));
        assert!(!token.scopes.contains("ads_read"));
    }

    #[tokio::test]
    async fn exchange_failure_is_terminal_with_detail() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v19.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid verification code format." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let requested = scopes(&["pages_show_list"]);
        let err = adapter
            .exchange_code(ExchangeParams {
                code: "bad-code",
                redirect_uri: "https://app.local/callback/meta",
                requested_scopes: &requested,
            })
            .await
            .unwrap_err();

        match err {
            ConnectError::TokenExchangeFailed { platform, detail } => {
                assert_eq!(platform, Platform::Meta);
                assert!(detail.contains("400"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn overlapping_page_edges_dedupe_to_one_asset() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": "page-1", "name": "Shared Page", "category": "Page" },
                    { "id": "page-2", "name": "Direct Only", "category": "Local Business" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .and(query_param_contains("fields", "accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accounts": {
                    "data": [
                        { "id": "page-1", "name": "Shared Page", "category": "FACEBOOK_PAGE" },
                        { "id": "page-3", "name": "Edge Only", "category": "Community" }
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let outcome = adapter
            .fetch_assets("meta-token", &scopes(&["pages_show_list"]), "user-77")
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        let mut page_ids: Vec<&str> = outcome
            .assets
            .iter()
            .filter(|asset| asset.kind == AssetKind::Page)
            .map(|asset| asset.id.as_str())
            .collect();
        page_ids.sort_unstable();
        assert_eq!(page_ids, vec!["page-1", "page-2", "page-3"]);
    }

    #[tokio::test]
    async fn ad_account_listing_is_scope_gated() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "accounts": { "data": [] } })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me/adaccounts"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .expect(0)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let outcome = adapter
            .fetch_assets("meta-token", &scopes(&["pages_show_list"]), "user-77")
            .await
            .unwrap();

        assert!(outcome.assets.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn instagram_accounts_require_instagram_scope() {
        let server = MockServer::start().await;

        let page_body = serde_json::json!({
            "data": [{
                "id": "page-1",
                "name": "Page",
                "category": "Page",
                "instagram_business_account": { "id": "ig-9", "username": "brand.ig" }
            }]
        });

        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body.clone()))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "accounts": { "data": [] } })),
            )
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());

        let without = adapter
            .fetch_assets("meta-token", &scopes(&["pages_show_list"]), "user-77")
            .await
            .unwrap();
        assert!(without
            .assets
            .iter()
            .all(|asset| asset.kind != AssetKind::InstagramAccount));

        let with = adapter
            .fetch_assets(
                "meta-token",
                &scopes(&["pages_show_list", "instagram_basic"]),
                "user-77",
            )
            .await
            .unwrap();
        assert!(with
            .assets
            .iter()
            .any(|asset| asset.kind == AssetKind::InstagramAccount && asset.id == "ig-9"));
    }

    #[tokio::test]
    async fn all_surfaces_failing_is_a_fetch_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me/accounts"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v19.0/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let err = adapter
            .fetch_assets("expired-token", &scopes(&["pages_show_list"]), "user-77")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectError::AssetFetchFailed {
                platform: Platform::Meta,
                kind: None,
                ..
            }
        ));
    }
}
