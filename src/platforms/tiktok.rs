//! TikTok integration
//!
//! TikTok responses come in two shapes depending on the API family: flat
//! objects, or a `{ code, message, data }` envelope where `code != 0`
//! signals failure with HTTP 200. Both are handled by extracting the
//! payload defensively instead of assuming one envelope.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::adapter::{
    http_client, truncate_body, ExchangeParams, FetchOutcome, PlatformAdapter, PlatformDefinition,
};
use crate::error::ConnectError;
use crate::model::{dedupe_assets, Asset, AssetKind, Connection, Platform, ScopeSet, TokenData};

const SCOPE_USER_INFO: &str = "user.info.basic";
const SCOPE_ADVERTISER: &str = "advertiser.read";
const SCOPE_ADS: &str = "ads.read";

pub struct TikTokAdapter {
    client_key: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    http: reqwest::Client,
}

/// Unwrap an optional `data` envelope: if the body has a `data` object,
/// fields are read from it, otherwise from the body itself.
fn payload(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if data.is_object() => data,
        _ => body,
    }
}

/// Extract the error description from whichever shape the response uses.
fn error_detail(body: &Value) -> String {
    body.get("message")
        .or_else(|| body.get("error_description"))
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error")
        .to_string()
}

/// Envelope-level failure: `code` present and non-zero.
fn envelope_failed(body: &Value) -> bool {
    matches!(body.get("code").and_then(Value::as_i64), Some(code) if code != 0)
}

impl TikTokAdapter {
    pub fn new(
        client_key: String,
        client_secret: String,
        oauth_base: String,
        api_base: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client_key,
            client_secret,
            oauth_base,
            api_base,
            http: http_client(timeout_secs),
        }
    }

    async fn token_request(
        &self,
        form: HashMap<&'static str, String>,
    ) -> Result<Value, ConnectError> {
        let response = self
            .http
            .post(format!("{}/v2/oauth/token/", self.api_base))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|err| ConnectError::TokenExchangeFailed {
                platform: Platform::TikTok,
                detail: err.to_string(),
            })?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ConnectError::TokenExchangeFailed {
                platform: Platform::TikTok,
                detail: format!("{}: {}", status, truncate_body(&body_text)),
            });
        }

        let body: Value =
            serde_json::from_str(&body_text).map_err(|err| ConnectError::TokenExchangeFailed {
                platform: Platform::TikTok,
                detail: format!("malformed token response: {}", err),
            })?;

        if envelope_failed(&body) {
            return Err(ConnectError::TokenExchangeFailed {
                platform: Platform::TikTok,
                detail: error_detail(&body),
            });
        }

        Ok(body)
    }

    fn token_data_from(
        &self,
        body: &Value,
        fallback_refresh: Option<&str>,
    ) -> Result<TokenData, ConnectError> {
        let data = payload(body);

        let access_token = data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectError::TokenExchangeFailed {
                platform: Platform::TikTok,
                detail: "token response missing access_token".to_string(),
            })?
            .to_string();

        let open_id = data
            .get("open_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectError::TokenExchangeFailed {
                platform: Platform::TikTok,
                detail: "token response missing open_id".to_string(),
            })?
            .to_string();

        let refresh_token = data
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| fallback_refresh.map(str::to_string));

        let expires_at = data
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        let scopes = data
            .get("scope")
            .and_then(Value::as_str)
            .map(|raw| {
                raw.split([',', ' '])
                    .filter(|s| !s.is_empty())
                    .collect::<ScopeSet>()
            })
            .unwrap_or_default();

        Ok(TokenData {
            access_token,
            refresh_token,
            expires_at,
            scopes,
            platform_username: open_id.clone(),
            platform_user_id: open_id,
        })
    }

    /// Display name lookup, best effort. The open id from the token
    /// response already identifies the user; a failure here only costs
    /// the username.
    async fn display_name(&self, access_token: &str) -> Option<String> {
        let body = self.user_info(access_token).await.ok()?;
        payload(&body)
            .get("user")
            .map(|user| user.get("display_name"))
            .unwrap_or_else(|| payload(&body).get("display_name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn user_info(&self, access_token: &str) -> Result<Value, String> {
        let response = self
            .http
            .get(format!("{}/v2/user/info/", self.api_base))
            .query(&[("fields", "open_id,display_name")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("{}: {}", status, truncate_body(&body_text)));
        }

        let body: Value = serde_json::from_str(&body_text).map_err(|err| err.to_string())?;
        if envelope_failed(&body) {
            return Err(error_detail(&body));
        }
        Ok(body)
    }

    async fn fetch_advertisers(&self, access_token: &str) -> Result<Vec<Asset>, String> {
        let response = self
            .http
            .get(format!(
                "{}/open_api/v1.3/oauth2/advertiser/get/",
                self.api_base
            ))
            .query(&[
                ("app_id", self.client_key.as_str()),
                ("secret", self.client_secret.as_str()),
            ])
            .header("Access-Token", access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("{}: {}", status, truncate_body(&body_text)));
        }

        let body: Value = serde_json::from_str(&body_text).map_err(|err| err.to_string())?;
        if envelope_failed(&body) {
            return Err(error_detail(&body));
        }

        let list = payload(&body)
            .get("list")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(list
            .into_iter()
            .filter_map(|entry| {
                let id = entry
                    .get("advertiser_id")
                    .map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .flatten()?;
                let name = entry
                    .get("advertiser_name")
                    .and_then(Value::as_str)
                    .unwrap_or(&id)
                    .to_string();
                Some(Asset::new(Platform::TikTok, AssetKind::Advertiser, id, name))
            })
            .collect())
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn definition(&self) -> PlatformDefinition {
        PlatformDefinition {
            platform: Platform::TikTok,
            display_name: "TikTok",
            default_scopes: vec![
                SCOPE_USER_INFO.to_string(),
                SCOPE_ADVERTISER.to_string(),
                SCOPE_ADS.to_string(),
            ],
            authorize_url: format!("{}/v2/auth/authorize/", self.oauth_base),
            token_url: format!("{}/v2/oauth/token/", self.api_base),
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
            .append_pair("client_key", &self.client_key)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &scopes.join(","))
            .append_pair("response_type", "code");
        Ok(url)
    }

    async fn exchange_code(&self, params: ExchangeParams<'_>) -> Result<TokenData, ConnectError> {
        let mut form = HashMap::new();
        form.insert("client_key", self.client_key.clone());
        form.insert("client_secret", self.client_secret.clone());
        form.insert("grant_type", "authorization_code".to_string());
        form.insert("redirect_uri", params.redirect_uri.to_string());
        form.insert("code", params.code.to_string());

        let body = self.token_request(form).await?;
        let mut token = self.token_data_from(&body, None)?;

        if token.scopes.is_empty() {
            token.scopes = params.requested_scopes.clone();
        }
        if let Some(name) = self.display_name(&token.access_token).await {
            token.platform_username = name;
        }

        Ok(token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenData, ConnectError> {
        let mut form = HashMap::new();
        form.insert("client_key", self.client_key.clone());
        form.insert("client_secret", self.client_secret.clone());
        form.insert("grant_type", "refresh_token".to_string());
        form.insert("refresh_token", refresh_token.to_string());

        let body = self.token_request(form).await?;
        self.token_data_from(&body, Some(refresh_token))
    }

    async fn fetch_assets(
        &self,
        access_token: &str,
        scopes: &ScopeSet,
        _platform_user_id: &str,
    ) -> Result<FetchOutcome, ConnectError> {
        let mut outcome = FetchOutcome::default();
        let mut attempted = 0usize;

        if scopes.contains(SCOPE_USER_INFO) {
            attempted += 1;
            match self.user_info(access_token).await {
                Ok(body) => {
                    let user = payload(&body);
                    let user = user.get("user").unwrap_or(user);
                    if let Some(open_id) = user.get("open_id").and_then(Value::as_str) {
                        let name = user
                            .get("display_name")
                            .and_then(Value::as_str)
                            .unwrap_or(open_id);
                        outcome.assets.push(Asset::new(
                            Platform::TikTok,
                            AssetKind::BusinessAccount,
                            open_id,
                            name,
                        ));
                    } else {
                        debug!("tiktok user info response carried no open_id");
                    }
                }
                Err(detail) => {
                    outcome.record_failure(Platform::TikTok, Some(AssetKind::BusinessAccount), detail)
                }
            }
        }

        if scopes.contains_any(&[SCOPE_ADVERTISER, SCOPE_ADS]) {
            attempted += 1;
            match self.fetch_advertisers(access_token).await {
                Ok(assets) => outcome.assets.extend(assets),
                Err(detail) => {
                    outcome.record_failure(Platform::TikTok, Some(AssetKind::Advertiser), detail)
                }
            }
        }

        if attempted > 0 && outcome.failures.len() == attempted {
            return Err(ConnectError::AssetFetchFailed {
                platform: Platform::TikTok,
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
        self.user_info(&connection.access_token).await.is_ok()
    }
}
