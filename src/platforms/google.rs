//! Google integration
//!
//! Each asset type lives behind its own API surface and its own scope:
//! Analytics properties, Ads accounts, Search Console sites, Tag Manager
//! containers, and Business Profile locations. A surface is only called
//! when its scope was granted, and one surface failing never aborts the
//! others.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::adapter::{
    http_client, truncate_body, ExchangeParams, FetchOutcome, PlatformAdapter, PlatformDefinition,
};
use crate::error::ConnectError;
use crate::model::{dedupe_assets, Asset, AssetKind, Connection, Platform, ScopeSet, TokenData};

pub const SCOPE_ANALYTICS: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const SCOPE_ADS: &str = "https://www.googleapis.com/auth/adwords";
pub const SCOPE_WEBMASTERS: &str = "https://www.googleapis.com/auth/webmasters.readonly";
pub const SCOPE_TAG_MANAGER: &str = "https://www.googleapis.com/auth/tagmanager.readonly";
pub const SCOPE_BUSINESS: &str = "https://www.googleapis.com/auth/business.manage";

pub struct GoogleAdapter {
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    http: reqwest::Client,
}

impl GoogleAdapter {
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

    fn token_url(&self) -> String {
        format!("{}/oauth2/v4/token", self.api_base)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        access_token: &str,
    ) -> Result<T, String> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, truncate_body(&body)));
        }

        response.json::<T>().await.map_err(|err| err.to_string())
    }

    async fn fetch_analytics_properties(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SummariesResponse {
            #[serde(default)]
            account_summaries: Vec<AccountSummary>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct AccountSummary {
            #[serde(default)]
            property_summaries: Vec<PropertySummary>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PropertySummary {
            property: String,
            display_name: Option<String>,
        }

        let body: SummariesResponse = self
            .get_json(
                format!("{}/analytics/admin/v1beta/accountSummaries", self.api_base),
                access_token,
            )
            .await?;

        Ok(body
            .account_summaries
            .into_iter()
            .flat_map(|account| account.property_summaries)
            .map(|property| {
                let name = property
                    .display_name
                    .clone()
                    .unwrap_or_else(|| property.property.clone());
                Asset::new(
                    Platform::Google,
                    AssetKind::AnalyticsProperty,
                    property.property,
                    name,
                )
            })
            .collect())
    }

    async fn fetch_ads_accounts(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CustomersResponse {
            #[serde(default)]
            resource_names: Vec<String>,
        }

        let body: CustomersResponse = self
            .get_json(
                format!(
                    "{}/googleads/v16/customers:listAccessibleCustomers",
                    self.api_base
                ),
                access_token,
            )
            .await?;

        Ok(body
            .resource_names
            .into_iter()
            .map(|resource| {
                let id = resource
                    .strip_prefix("customers/")
                    .unwrap_or(&resource)
                    .to_string();
                let name = format!("Ads account {}", id);
                Asset::new(Platform::Google, AssetKind::AdsAccount, id, name)
            })
            .collect())
    }

    async fn fetch_search_console_sites(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SitesResponse {
            #[serde(default)]
            site_entry: Vec<SiteEntry>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SiteEntry {
            site_url: String,
            permission_level: Option<String>,
        }

        let body: SitesResponse = self
            .get_json(
                format!("{}/webmasters/v3/sites", self.api_base),
                access_token,
            )
            .await?;

        Ok(body
            .site_entry
            .into_iter()
            .map(|site| {
                let mut asset = Asset::new(
                    Platform::Google,
                    AssetKind::SearchConsoleSite,
                    site.site_url.clone(),
                    site.site_url,
                );
                if let Some(level) = site.permission_level {
                    asset = asset.with_metadata(json!({ "permission_level": level }));
                }
                asset
            })
            .collect())
    }

    async fn fetch_tag_manager_containers(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        struct AccountsResponse {
            #[serde(default)]
            account: Vec<TagManagerAccount>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TagManagerAccount {
            account_id: String,
        }
        #[derive(Deserialize)]
        struct ContainersResponse {
            #[serde(default)]
            container: Vec<TagManagerContainer>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TagManagerContainer {
            container_id: String,
            name: Option<String>,
            public_id: Option<String>,
        }

        let accounts: AccountsResponse = self
            .get_json(
                format!("{}/tagmanager/v2/accounts", self.api_base),
                access_token,
            )
            .await?;

        let mut assets = Vec::new();
        for account in accounts.account {
            let containers: ContainersResponse = self
                .get_json(
                    format!(
                        "{}/tagmanager/v2/accounts/{}/containers",
                        self.api_base, account.account_id
                    ),
                    access_token,
                )
                .await?;
            for container in containers.container {
                let name = container
                    .name
                    .clone()
                    .or(container.public_id.clone())
                    .unwrap_or_else(|| container.container_id.clone());
                let mut asset = Asset::new(
                    Platform::Google,
                    AssetKind::TagManagerContainer,
                    container.container_id,
                    name,
                );
                if let Some(public_id) = container.public_id {
                    asset = asset.with_metadata(json!({ "public_id": public_id }));
                }
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    async fn fetch_business_locations(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        #[derive(Deserialize)]
        struct AccountsResponse {
            #[serde(default)]
            accounts: Vec<BusinessAccount>,
        }
        #[derive(Deserialize)]
        struct BusinessAccount {
            /// Resource name, e.g. `accounts/123`.
            name: String,
        }
        #[derive(Deserialize)]
        struct LocationsResponse {
            #[serde(default)]
            locations: Vec<BusinessLocation>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BusinessLocation {
            name: String,
            location_name: Option<String>,
        }

        let accounts: AccountsResponse = self
            .get_json(
                format!("{}/mybusiness/v4/accounts", self.api_base),
                access_token,
            )
            .await?;

        let mut assets = Vec::new();
        for account in accounts.accounts {
            let locations: LocationsResponse = self
                .get_json(
                    format!("{}/mybusiness/v4/{}/locations", self.api_base, account.name),
                    access_token,
                )
                .await?;
            for location in locations.locations {
                let display = location
                    .location_name
                    .clone()
                    .unwrap_or_else(|| location.name.clone());
                assets.push(Asset::new(
                    Platform::Google,
                    AssetKind::BusinessLocation,
                    location.name,
                    display,
                ));
            }
        }
        Ok(assets)
    }

    async fn resolve_identity(&self, access_token: &str) -> Result<(String, String), ConnectError> {
        #[derive(Deserialize)]
        struct UserInfo {
            sub: String,
            email: Option<String>,
            name: Option<String>,
        }

        let info: UserInfo = self
            .get_json(
                format!("{}/oauth2/v3/userinfo", self.api_base),
                access_token,
            )
            .await
            .map_err(|detail| ConnectError::TokenExchangeFailed {
                platform: Platform::Google,
                detail: format!("identity lookup failed: {}", detail),
            })?;

        let username = info.email.or(info.name).unwrap_or_else(|| info.sub.clone());
        Ok((info.sub, username))
    }

    async fn token_request(
        &self,
        form: HashMap<&'static str, String>,
    ) -> Result<GoogleTokenResponse, ConnectError> {
        let response = self
            .http
            .post(self.token_url())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|err| ConnectError::TokenExchangeFailed {
                platform: Platform::Google,
                detail: err.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::TokenExchangeFailed {
                platform: Platform::Google,
                detail: format!("{}: {}", status, truncate_body(&body)),
            });
        }

        response
            .json()
            .await
            .map_err(|err| ConnectError::TokenExchangeFailed {
                platform: Platform::Google,
                detail: format!("malformed token response: {}", err),
            })
    }
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[async_trait]
impl PlatformAdapter for GoogleAdapter {
    fn definition(&self) -> PlatformDefinition {
        PlatformDefinition {
            platform: Platform::Google,
            display_name: "Google",
            default_scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                SCOPE_ANALYTICS.to_string(),
                SCOPE_ADS.to_string(),
                SCOPE_WEBMASTERS.to_string(),
                SCOPE_TAG_MANAGER.to_string(),
                SCOPE_BUSINESS.to_string(),
            ],
            authorize_url: format!("{}/o/oauth2/v2/auth", self.oauth_base),
            token_url: self.token_url(),
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
            .append_pair("scope", &scopes.join(" "))
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    async fn exchange_code(&self, params: ExchangeParams<'_>) -> Result<TokenData, ConnectError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code".to_string());
        form.insert("client_id", self.client_id.clone());
        form.insert("client_secret", self.client_secret.clone());
        form.insert("redirect_uri", params.redirect_uri.to_string());
        form.insert("code", params.code.to_string());

        let token = self.token_request(form).await?;
        let (platform_user_id, platform_username) =
            self.resolve_identity(&token.access_token).await?;

        let scopes = match token.scope.as_deref() {
            Some(granted) if !granted.trim().is_empty() => {
                granted.split_whitespace().collect::<ScopeSet>()
            }
            _ => params.requested_scopes.clone(),
        };

        Ok(TokenData {
            expires_at: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            scopes,
            platform_user_id,
            platform_username,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenData, ConnectError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token".to_string());
        form.insert("client_id", self.client_id.clone());
        form.insert("client_secret", self.client_secret.clone());
        form.insert("refresh_token", refresh_token.to_string());

        let token = self.token_request(form).await?;
        let (platform_user_id, platform_username) =
            self.resolve_identity(&token.access_token).await?;

        let scopes = token
            .scope
            .as_deref()
            .map(|granted| granted.split_whitespace().collect::<ScopeSet>())
            .unwrap_or_default();

        Ok(TokenData {
            expires_at: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            access_token: token.access_token,
            // Google only returns a refresh token on the initial grant.
            refresh_token: token
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            scopes,
            platform_user_id,
            platform_username,
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

        if scopes.contains(SCOPE_ANALYTICS) {
            attempted += 1;
            match self.fetch_analytics_properties(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => outcome.record_failure(
                    Platform::Google,
                    Some(AssetKind::AnalyticsProperty),
                    detail,
                ),
            }
        }

        if scopes.contains(SCOPE_ADS) {
            attempted += 1;
            match self.fetch_ads_accounts(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => {
                    outcome.record_failure(Platform::Google, Some(AssetKind::AdsAccount), detail)
                }
            }
        }

        if scopes.contains(SCOPE_WEBMASTERS) {
            attempted += 1;
            match self.fetch_search_console_sites(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => outcome.record_failure(
                    Platform::Google,
                    Some(AssetKind::SearchConsoleSite),
                    detail,
                ),
            }
        }

        if scopes.contains(SCOPE_TAG_MANAGER) {
            attempted += 1;
            match self.fetch_tag_manager_containers(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => outcome.record_failure(
                    Platform::Google,
                    Some(AssetKind::TagManagerContainer),
                    detail,
                ),
            }
        }

        if scopes.contains(SCOPE_BUSINESS) {
            attempted += 1;
            match self.fetch_business_locations(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => outcome.record_failure(
                    Platform::Google,
                    Some(AssetKind::BusinessLocation),
                    detail,
                ),
            }
        }

        if attempted > 0 && outcome.failures.len() == attempted {
            return Err(ConnectError::AssetFetchFailed {
                platform: Platform::Google,
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
            .get(format!("{}/oauth2/v3/tokeninfo", self.api_base))
            .query(&[("access_token", connection.access_token.as_str())])
            .send()
            .await;
        matches!(result, Ok(response) if response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> GoogleAdapter {
        GoogleAdapter::new(
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
    fn authorize_url_requests_offline_access() {
        let adapter = adapter("https://accounts.google.com");
        let requested = scopes(&["openid", SCOPE_ANALYTICS]);
        let url = adapter
            .authorize_url("https://app.local/callback/google", &requested, "state-2")
            .unwrap();

        assert_eq!(url.path(), "/o/oauth2/v2/auth");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs.get("access_type").unwrap(), "offline");
        assert_eq!(pairs.get("prompt").unwrap(), "consent");
        assert_eq!(
            pairs.get("scope").unwrap(),
            &format!("openid {}", SCOPE_ANALYTICS)
        );
    }

    #[tokio::test]
    async fn exchange_parses_granted_scope_string() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v4/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "google-token",
                "refresh_token": "google-refresh",
                "expires_in": 3599,
                "scope": format!("openid {}", SCOPE_WEBMASTERS),
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/oauth2/v3/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "goog-123",
                "email": "owner@example.com"
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let requested = scopes(&["openid", SCOPE_WEBMASTERS, SCOPE_ADS]);
        let token = adapter
            .exchange_code(ExchangeParams {
                code: "one-time",
                redirect_uri: "https://app.local/callback/google",
                requested_scopes: &requested,
            })
            .await
            .unwrap();

        assert_eq!(token.platform_user_id, "goog-123");
        assert_eq!(token.platform_username, "owner@example.com");
        assert_eq!(token.refresh_token.as_deref(), Some("google-refresh"));
        // granted, not requested: ads scope was not in the provider echo
        assert!(token.scopes.contains(SCOPE_WEBMASTERS));
        assert!(!token.scopes.contains(SCOPE_ADS));
    }

    #[tokio::test]
    async fn refresh_keeps_existing_refresh_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v4/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "expires_in": 3599,
                "scope": SCOPE_WEBMASTERS
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/oauth2/v3/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "goog-123",
                "email": "owner@example.com"
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let token = adapter.refresh("google-refresh").await.unwrap();
        assert_eq!(token.access_token, "fresh-token");
        assert_eq!(token.refresh_token.as_deref(), Some("google-refresh"));
    }

    #[tokio::test]
    async fn missing_ads_scope_never_touches_the_ads_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/webmasters/v3/sites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "siteEntry": [
                    { "siteUrl": "https://shop.example.com/", "permissionLevel": "siteOwner" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/googleads/v16/customers:listAccessibleCustomers"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let outcome = adapter
            .fetch_assets("google-token", &scopes(&[SCOPE_WEBMASTERS]), "goog-123")
            .await
            .unwrap();

        assert_eq!(outcome.assets.len(), 1);
        assert_eq!(outcome.assets[0].kind, AssetKind::SearchConsoleSite);
        assert!(outcome
            .assets
            .iter()
            .all(|asset| asset.kind != AssetKind::AdsAccount));
    }

    #[tokio::test]
    async fn one_failing_surface_yields_partial_result() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/analytics/admin/v1beta/accountSummaries"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/webmasters/v3/sites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "siteEntry": [
                    { "siteUrl": "sc-domain:example.com" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let outcome = adapter
            .fetch_assets(
                "google-token",
                &scopes(&[SCOPE_ANALYTICS, SCOPE_WEBMASTERS]),
                "goog-123",
            )
            .await
            .unwrap();

        assert_eq!(outcome.assets.len(), 1);
        assert_eq!(outcome.assets[0].id, "sc-domain:example.com");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].kind,
            Some(AssetKind::AnalyticsProperty)
        );
        assert!(outcome.failures[0].detail.contains("500"));
    }

    #[tokio::test]
    async fn analytics_properties_flatten_across_accounts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/analytics/admin/v1beta/accountSummaries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accountSummaries": [
                    {
                        "account": "accounts/1",
                        "propertySummaries": [
                            { "property": "properties/101", "displayName": "Site A" },
                            { "property": "properties/102", "displayName": "Site B" }
                        ]
                    },
                    {
                        "account": "accounts/2",
                        "propertySummaries": [
                            { "property": "properties/201", "displayName": "Site C" }
                        ]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let outcome = adapter
            .fetch_assets("google-token", &scopes(&[SCOPE_ANALYTICS]), "goog-123")
            .await
            .unwrap();

        assert_eq!(outcome.assets.len(), 3);
        assert!(outcome
            .assets
            .iter()
            .all(|asset| asset.kind == AssetKind::AnalyticsProperty));
        assert_eq!(outcome.assets[2].name, "Site C");
    }
}
