//! Platform integrations
//!
//! One adapter per supported platform plus the registry that holds them.

pub mod adapter;
pub mod google;
pub mod meta;
pub mod registry;
pub mod shopify;
pub mod tiktok;

pub use adapter::{
    AssetFetchFailure, ExchangeParams, FetchOutcome, PlatformAdapter, PlatformDefinition,
};
pub use google::GoogleAdapter;
pub use meta::MetaAdapter;
pub use registry::PlatformRegistry;
pub use shopify::ShopifyAdapter;
pub use tiktok::TikTokAdapter;
