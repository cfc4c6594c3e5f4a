//! Onboarding collaborator records
//!
//! The link and request records are owned by the portal, not by this engine;
//! the engine reads and writes them through the store trait to resume client
//! flows and to attach connection ids, but does not manage their lifecycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Platform, ScopeSet};

/// Single-use onboarding link handed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingLink {
    /// Unguessable token; doubles as the correlation id threaded through
    /// OAuth state for client flows.
    pub token: String,
    pub client_name: String,
    /// Platforms the admin asked the client to connect, with the scopes
    /// requested for each. Structured mapping, never a joined string.
    pub requested: BTreeMap<Platform, ScopeSet>,
    pub expires_at: DateTime<Utc>,
}

impl OnboardingLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Aggregate of one client's onboarding session: which connections the
/// client granted so far and whether the session is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub id: Uuid,
    pub link_token: String,
    pub client_name: String,
    pub connection_ids: Vec<Uuid>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingRequest {
    pub fn for_link(link: &OnboardingLink) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            link_token: link.token.clone(),
            client_name: link.client_name.clone(),
            connection_ids: Vec::new(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a granted connection; idempotent per connection id.
    pub fn attach_connection(&mut self, connection_id: Uuid) {
        if !self.connection_ids.contains(&connection_id) {
            self.connection_ids.push(connection_id);
            self.updated_at = Utc::now();
        }
    }
}
