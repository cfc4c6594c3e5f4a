//! # Data Models
//!
//! Core domain types shared by the orchestrator, fetcher and reconciler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod asset;
pub mod connection;
pub mod onboarding;

pub use asset::{dedupe_assets, Asset, AssetKind};
pub use connection::Connection;
pub use onboarding::{OnboardingLink, OnboardingRequest};

/// Supported external platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Meta,
    Google,
    TikTok,
    Shopify,
}

impl Platform {
    /// Stable snake_case identifier used in URLs, state tokens and storage keys.
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
            Platform::TikTok => "tiktok",
            Platform::Shopify => "shopify",
        }
    }

    /// All supported platforms in stable order.
    pub fn all() -> [Platform; 4] {
        [
            Platform::Meta,
            Platform::Google,
            Platform::TikTok,
            Platform::Shopify,
        ]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(Platform::Meta),
            "google" => Ok(Platform::Google),
            "tiktok" => Ok(Platform::TikTok),
            "shopify" => Ok(Platform::Shopify),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Error for unrecognized platform slugs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown platform '{0}'")]
pub struct UnknownPlatform(pub String);

/// The kind of entity holding a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Admin,
    Client,
}

/// The entity (admin account or onboarded client) that holds a connection.
///
/// Every core API takes an explicit owner; nothing in the engine defaults to
/// an implicit identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub kind: OwnerKind,
}

impl Owner {
    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            kind: OwnerKind::Admin,
        }
    }

    pub fn client<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            kind: OwnerKind::Client,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            OwnerKind::Admin => "admin",
            OwnerKind::Client => "client",
        };
        write!(f, "{}:{}", kind, self.id)
    }
}

/// Ordered set of granted OAuth scope strings.
///
/// Preserves grant order, deduplicates on insert. Scope strings are compared
/// exactly; providers that return space- or comma-joined scope lists are
/// split at the adapter boundary, never stored joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert<S: Into<String>>(&mut self, scope: S) {
        let scope = scope.into();
        if !self.0.iter().any(|s| s == &scope) {
            self.0.push(scope);
        }
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// True if any of the given scopes is present.
    pub fn contains_any(&self, scopes: &[&str]) -> bool {
        scopes.iter().any(|s| self.contains(s))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Join with the given separator for provider query strings.
    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = ScopeSet::new();
        for scope in iter {
            set.insert(scope);
        }
        set
    }
}

/// Token material and external identity produced by a successful code
/// exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absent for platforms whose tokens never expire (Shopify store access).
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub scopes: ScopeSet,
    /// Provider-issued identifier for the authorized identity; idempotency
    /// key across reconnects.
    pub platform_user_id: String,
    pub platform_username: String,
}
