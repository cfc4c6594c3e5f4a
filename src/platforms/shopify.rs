//! Shopify integration
//!
//! Shopify has no live asset-listing API in this design. A connection is
//! established manually from a store domain and a collaborator access
//! code; the store domain doubles as the stable external identity. Tokens
//! never expire and the validity probe is a local identifier check.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use super::adapter::{ExchangeParams, FetchOutcome, PlatformAdapter, PlatformDefinition};
use crate::error::ConnectError;
use crate::model::{Asset, AssetKind, Connection, Platform, ScopeSet, TokenData};

fn store_domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]*\.myshopify\.com$").unwrap())
}

fn collaborator_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{4,64}$").unwrap())
}

/// Normalize user input into a bare `*.myshopify.com` domain: lowercase,
/// scheme and trailing slash stripped.
pub fn normalize_store_domain(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(&trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

pub fn validate_store_domain(domain: &str) -> Result<(), ConnectError> {
    if store_domain_re().is_match(domain) {
        Ok(())
    } else {
        Err(ConnectError::Validation(format!(
            "'{}' is not a valid myshopify.com store domain",
            domain
        )))
    }
}

pub fn validate_collaborator_code(code: &str) -> Result<(), ConnectError> {
    if collaborator_code_re().is_match(code.trim()) {
        Ok(())
    } else {
        Err(ConnectError::Validation(
            "collaborator access code must be 4-64 characters (letters, digits, - or _)"
                .to_string(),
        ))
    }
}

/// Build the token material for a manual store connection. The collaborator
/// code stands in for the access token and never expires.
pub fn store_grant(store_domain: &str, collaborator_code: &str) -> Result<TokenData, ConnectError> {
    let domain = normalize_store_domain(store_domain);
    validate_store_domain(&domain)?;
    let code = collaborator_code.trim();
    validate_collaborator_code(code)?;

    Ok(TokenData {
        access_token: code.to_string(),
        refresh_token: None,
        expires_at: None,
        scopes: ScopeSet::new(),
        platform_username: domain.clone(),
        platform_user_id: domain,
    })
}

#[derive(Default)]
pub struct ShopifyAdapter;

impl ShopifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlatformAdapter for ShopifyAdapter {
    fn definition(&self) -> PlatformDefinition {
        PlatformDefinition {
            platform: Platform::Shopify,
            display_name: "Shopify",
            default_scopes: Vec::new(),
            authorize_url: String::new(),
            token_url: String::new(),
            manual: true,
        }
    }

    fn authorize_url(
        &self,
        _redirect_uri: &str,
        _scopes: &ScopeSet,
        _state: &str,
    ) -> Result<Url, ConnectError> {
        Err(ConnectError::Validation(
            "shopify connections are created from a store domain and collaborator code".to_string(),
        ))
    }

    async fn exchange_code(&self, _params: ExchangeParams<'_>) -> Result<TokenData, ConnectError> {
        Err(ConnectError::Validation(
            "shopify connections are created from a store domain and collaborator code".to_string(),
        ))
    }

    async fn fetch_assets(
        &self,
        _access_token: &str,
        _scopes: &ScopeSet,
        platform_user_id: &str,
    ) -> Result<FetchOutcome, ConnectError> {
        // The store itself is the only asset; it is derived from the stored
        // identity, not fetched.
        let mut outcome = FetchOutcome::default();
        if !platform_user_id.is_empty() {
            outcome.assets.push(Asset::new(
                Platform::Shopify,
                AssetKind::Store,
                platform_user_id,
                platform_user_id,
            ));
        }
        Ok(outcome)
    }

    async fn probe(&self, connection: &Connection) -> bool {
        !connection.access_token.trim().is_empty()
            && !connection.platform_user_id.trim().is_empty()
    }
}
