//! Connection model
//!
//! One grant of access by one owner (admin or client) to one platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Asset, Owner, Platform, ScopeSet, TokenData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub owner: Owner,
    pub platform: Platform,
    /// Provider-issued stable identifier for the external identity. Together
    /// with owner+platform this is the idempotency key across reconnects.
    pub platform_user_id: String,
    pub platform_username: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// None for tokens that never expire (Shopify store access).
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: ScopeSet,
    pub is_active: bool,
    pub assets: Vec<Asset>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Build a fresh connection from an exchange result and its first
    /// materialized asset set.
    pub fn from_grant(owner: Owner, platform: Platform, token: TokenData, assets: Vec<Asset>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            platform,
            platform_user_id: token.platform_user_id,
            platform_username: token.platform_username,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
            scopes: token.scopes,
            is_active: true,
            assets,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace token fields and asset set in place. Preserves `id`, `owner`
    /// and `created_at`; bumps `updated_at`. The caller persists the result
    /// as a single atomic record replace.
    pub fn apply_grant(&mut self, token: TokenData, assets: Vec<Asset>) {
        debug_assert_eq!(self.platform_user_id, token.platform_user_id);
        self.platform_username = token.platform_username;
        self.access_token = token.access_token;
        self.refresh_token = token.refresh_token;
        self.expires_at = token.expires_at;
        self.scopes = token.scopes;
        self.assets = assets;
        self.is_active = true;
        self.updated_at = Utc::now();
    }

    /// Replace only the asset set (repair pass).
    pub fn replace_assets(&mut self, assets: Vec<Asset>) {
        self.assets = assets;
        self.updated_at = Utc::now();
    }

    /// Soft delete: excluded from "connected" listings, retained for audit
    /// and repair.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    /// True when `expires_at` is set and falls within `lead_time` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, lead_time: chrono::Duration) -> bool {
        match self.expires_at {
            Some(at) => at <= now + lead_time,
            None => false,
        }
    }
}
