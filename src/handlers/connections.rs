//! # Connections API Handlers
//!
//! Owner-scoped connection listing. Responses never carry raw tokens;
//! token presence is reported as booleans.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ConnectError};
use crate::model::{Asset, Connection, Owner, OwnerKind};
use crate::server::AppState;

/// Query parameters for connections listing
#[derive(Debug, Deserialize)]
pub struct ListConnectionsQuery {
    pub owner_id: String,
    #[serde(default = "default_owner_kind")]
    pub owner_kind: OwnerKind,
    /// Include deactivated connections as well.
    #[serde(default)]
    pub include_inactive: bool,
}

fn default_owner_kind() -> OwnerKind {
    OwnerKind::Admin
}

/// Connection view for API responses. Tokens stay server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub platform: String,
    pub platform_user_id: String,
    pub platform_username: String,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub scopes: Vec<String>,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub assets: Vec<Asset>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Connection> for ConnectionInfo {
    fn from(conn: Connection) -> Self {
        Self {
            id: conn.id,
            platform: conn.platform.slug().to_string(),
            platform_user_id: conn.platform_user_id,
            platform_username: conn.platform_username,
            is_active: conn.is_active,
            expires_at: conn.expires_at.map(|dt| dt.to_rfc3339()),
            scopes: conn.scopes.iter().map(|s| s.to_string()).collect(),
            has_access_token: !conn.access_token.is_empty(),
            has_refresh_token: conn.refresh_token.is_some(),
            assets: conn.assets,
            created_at: conn.created_at.to_rfc3339(),
            updated_at: conn.updated_at.to_rfc3339(),
        }
    }
}

/// Response wrapper for connections listing
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
}

/// Lists connections held by an owner. Active connections only unless
/// `include_inactive` is set.
pub async fn list_connections(
    State(state): State<AppState>,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let owner = Owner {
        id: query.owner_id,
        kind: query.owner_kind,
    };
    let connections = state
        .store
        .list_connections(&owner)
        .await
        .map_err(ConnectError::from)?
        .into_iter()
        .filter(|conn| query.include_inactive || conn.is_active)
        .map(ConnectionInfo::from)
        .collect();
    Ok(Json(ConnectionsResponse { connections }))
}
