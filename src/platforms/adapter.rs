//! Platform adapter contract
//!
//! Defines the interface every platform integration implements: static
//! definition, authorize-URL construction, code exchange, token refresh,
//! asset listing, and a cheap live-validity probe.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::error::ConnectError;
use crate::model::{Asset, AssetKind, Connection, Platform, ScopeSet, TokenData};

/// Static, immutable description of a platform integration. One per
/// supported platform; never mutated at runtime.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformDefinition {
    pub platform: Platform,
    pub display_name: &'static str,
    /// Default scopes requested when the caller does not narrow them.
    pub default_scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// Manual platforms are connected with user-entered identifiers
    /// instead of an OAuth redirect.
    pub manual: bool,
}

/// Inputs for an authorization-code exchange.
#[derive(Debug, Clone)]
pub struct ExchangeParams<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    /// Scopes the flow asked for, used as a fallback when the provider
    /// does not echo granted scopes back.
    pub requested_scopes: &'a ScopeSet,
}

/// One recorded per-asset-kind fetch failure. Failures at this granularity
/// never abort sibling fetches.
#[derive(Debug, Clone, Serialize)]
pub struct AssetFetchFailure {
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssetKind>,
    pub detail: String,
}

/// Result of an asset fetch: whatever was retrieved plus whatever failed.
/// An empty asset list with no failures is a valid outcome.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub assets: Vec<Asset>,
    pub failures: Vec<AssetFetchFailure>,
}

impl FetchOutcome {
    pub fn merge(&mut self, other: FetchOutcome) {
        self.assets.extend(other.assets);
        self.failures.extend(other.failures);
    }

    pub fn record_failure(&mut self, platform: Platform, kind: Option<AssetKind>, detail: String) {
        self.failures.push(AssetFetchFailure {
            platform,
            kind,
            detail,
        });
    }
}

/// Interface implemented by every platform integration.
///
/// Asset fetches are read-only and idempotent; adapters contain all
/// provider-specific field mapping so callers stay provider-agnostic.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Static definition for this platform.
    fn definition(&self) -> PlatformDefinition;

    /// Build the provider authorize URL for a flow attempt. The redirect
    /// URI must exactly match what is registered with the provider.
    fn authorize_url(
        &self,
        redirect_uri: &str,
        scopes: &ScopeSet,
        state: &str,
    ) -> Result<Url, ConnectError>;

    /// Exchange a one-time authorization code for tokens, resolving the
    /// stable platform user id and username in the same step.
    async fn exchange_code(&self, params: ExchangeParams<'_>) -> Result<TokenData, ConnectError>;

    /// Refresh an access token. Platforms without refresh tokens keep the
    /// default, which reports the exchange as unsupported.
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenData, ConnectError> {
        Err(ConnectError::TokenExchangeFailed {
            platform: self.definition().platform,
            detail: "token refresh not supported".to_string(),
        })
    }

    /// List the assets reachable with this token, deduplicated by
    /// `(platform, kind, id)`. Sub-fetches are attempted only when their
    /// required scope was granted; per-kind failures are collected in the
    /// outcome rather than raised.
    async fn fetch_assets(
        &self,
        access_token: &str,
        scopes: &ScopeSet,
        platform_user_id: &str,
    ) -> Result<FetchOutcome, ConnectError>;

    /// Cheap live-validity check for a stored connection.
    async fn probe(&self, connection: &Connection) -> bool;
}

/// Shared HTTP client with the configured per-request timeout. Every
/// provider call goes through a client built here so one slow provider
/// cannot stall unrelated work indefinitely.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Truncate a provider error body for inclusion in error details.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_outcome_merge_accumulates() {
        let mut outcome = FetchOutcome::default();
        outcome.assets.push(Asset::new(
            Platform::Meta,
            AssetKind::Page,
            "1",
            "Page One",
        ));

        let mut other = FetchOutcome::default();
        other.record_failure(
            Platform::Meta,
            Some(AssetKind::AdAccount),
            "500".to_string(),
        );
        outcome.merge(other);

        assert_eq!(outcome.assets.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, Some(AssetKind::AdAccount));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);
        assert!(truncated.len() <= 260);
        assert!(truncated.ends_with("..."));
    }
}
