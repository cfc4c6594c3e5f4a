//! Platform registry
//!
//! Holds the adapter for each configured platform. Adding a platform means
//! adding one adapter module and one registration call here; nothing else
//! changes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::adapter::{PlatformAdapter, PlatformDefinition};
use super::{GoogleAdapter, MetaAdapter, ShopifyAdapter, TikTokAdapter};
use crate::config::AppConfig;
use crate::error::ConnectError;
use crate::model::Platform;

#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.definition().platform, adapter);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>, ConnectError> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or_else(|| ConnectError::UnknownPlatform(platform.slug().to_string()))
    }

    /// Static definitions of every registered platform, in declaration order.
    pub fn definitions(&self) -> Vec<PlatformDefinition> {
        let mut definitions: Vec<PlatformDefinition> = self
            .adapters
            .values()
            .map(|adapter| adapter.definition())
            .collect();
        definitions.sort_by_key(|definition| definition.platform);
        definitions
    }

    pub fn is_registered(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }

    /// Build the registry from configuration. OAuth platforms are only
    /// registered when their client credentials are present; the manual
    /// Shopify path needs none.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        let timeout = config.provider_timeout_secs;

        if let (Some(client_id), Some(client_secret)) = (
            config.meta_client_id.clone(),
            config.meta_client_secret.clone(),
        ) {
            registry.register(Arc::new(MetaAdapter::new(
                client_id,
                client_secret,
                config.meta_oauth_base.clone(),
                config.meta_api_base.clone(),
                timeout,
            )));
        } else {
            warn!("meta adapter not registered: missing client credentials");
        }

        if let (Some(client_id), Some(client_secret)) = (
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ) {
            registry.register(Arc::new(GoogleAdapter::new(
                client_id,
                client_secret,
                config.google_oauth_base.clone(),
                config.google_api_base.clone(),
                timeout,
            )));
        } else {
            warn!("google adapter not registered: missing client credentials");
        }

        if let (Some(client_key), Some(client_secret)) = (
            config.tiktok_client_id.clone(),
            config.tiktok_client_secret.clone(),
        ) {
            registry.register(Arc::new(TikTokAdapter::new(
                client_key,
                client_secret,
                config.tiktok_oauth_base.clone(),
                config.tiktok_api_base.clone(),
                timeout,
            )));
        } else {
            warn!("tiktok adapter not registered: missing client credentials");
        }

        registry.register(Arc::new(ShopifyAdapter::new()));

        registry
    }
}
