//! Asset model
//!
//! A normalized capability-bearing resource inside a platform account. Every
//! provider adapter maps its own response shapes into this one type; nothing
//! above the adapter layer sees provider JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::Platform;

/// What a normalized asset represents, tagged per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    // Meta
    Page,
    AdAccount,
    Catalog,
    InstagramAccount,
    Business,
    // Google
    AnalyticsProperty,
    AdsAccount,
    SearchConsoleSite,
    TagManagerContainer,
    BusinessLocation,
    // TikTok
    Advertiser,
    BusinessAccount,
    // Shopify
    Store,
}

/// A resource inside a provider account that grants a specific capability.
///
/// `id` is provider-scoped and NOT globally unique across platforms; the
/// dedup identity is the `(platform, kind, id)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub platform: Platform,
    pub kind: AssetKind,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl Asset {
    pub fn new<I, N>(platform: Platform, kind: AssetKind, id: I, name: N) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            platform,
            kind,
            id: id.into(),
            name: name.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Identity triple used for within-connection deduplication.
    pub fn dedupe_key(&self) -> (Platform, AssetKind, &str) {
        (self.platform, self.kind, self.id.as_str())
    }
}

/// Deduplicate assets by `(platform, kind, id)`, keeping first occurrence
/// and input order. Provider list endpoints can surface the same object
/// through multiple query paths; the merged result must contain it once.
pub fn dedupe_assets(assets: Vec<Asset>) -> Vec<Asset> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(assets.len());
    for asset in assets {
        let key = (asset.platform, asset.kind, asset.id.clone());
        if seen.insert(key) {
            out.push(asset);
        }
    }
    out
}
