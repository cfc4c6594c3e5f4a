//! # Connection Flow Handlers
//!
//! Endpoints that start OAuth flows, consume provider callbacks, and
//! create manual Shopify connections.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use serde::Deserialize;
use tracing::warn;

use crate::error::{ApiError, ConnectError};
use crate::handlers::connections::ConnectionInfo;
use crate::model::{Owner, OwnerKind, Platform};
use crate::oauth::{CallbackQuery, FlowPurpose, StateToken};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PlatformPath {
    pub platform: String,
}

#[derive(Debug, Deserialize)]
pub struct OnboardConnectPath {
    pub link: String,
    pub platform: String,
}

/// Query parameters for the admin self-connect endpoint.
#[derive(Debug, Deserialize)]
pub struct StartConnectQuery {
    pub owner_id: String,
    #[serde(default = "default_owner_kind")]
    pub owner_kind: OwnerKind,
}

fn default_owner_kind() -> OwnerKind {
    OwnerKind::Admin
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    raw.parse::<Platform>()
        .map_err(|err| ConnectError::UnknownPlatform(err.0).into())
}

/// Start an OAuth flow for an admin-held connection. Redirects to the
/// provider's authorization page.
pub async fn start_connect(
    State(state): State<AppState>,
    Path(path): Path<PlatformPath>,
    Query(query): Query<StartConnectQuery>,
) -> Result<Redirect, ApiError> {
    let platform = parse_platform(&path.platform)?;
    let owner = Owner {
        id: query.owner_id,
        kind: query.owner_kind,
    };
    let url = state
        .orchestrator
        .authorize_url(platform, owner, FlowPurpose::AdminConnect, None, None)
        .await?;
    Ok(Redirect::temporary(url.as_str()))
}

/// Start an OAuth flow from an onboarding link. The link token rides in the
/// state parameter so the callback can attach the connection to the
/// onboarding request without a session.
pub async fn start_onboard_connect(
    State(state): State<AppState>,
    Path(path): Path<OnboardConnectPath>,
) -> Result<Redirect, ApiError> {
    let platform = parse_platform(&path.platform)?;
    let link = state
        .store
        .get_link(&path.link)
        .await
        .map_err(ConnectError::from)?
        .ok_or_else(|| ConnectError::LinkRejected("unknown link".to_string()))?;
    let owner = Owner::client(link.client_name);
    let url = state
        .orchestrator
        .authorize_url(
            platform,
            owner,
            FlowPurpose::ClientOnboarding,
            Some(path.link),
            None,
        )
        .await?;
    Ok(Redirect::temporary(url.as_str()))
}

/// Consume the provider callback and bounce the browser back to the app.
/// Every outcome is a redirect: success carries `?connected=<platform>`,
/// failure carries a stable `?error=<code>`.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(path): Path<PlatformPath>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let base = state.config.base_app_url.trim_end_matches('/');
    let platform = match path.platform.parse::<Platform>() {
        Ok(platform) => platform,
        Err(err) => {
            warn!(platform = %err.0, "callback for unknown platform");
            return Redirect::temporary(&format!("{}/?error=unknown_platform", base));
        }
    };

    let raw_state = query.state.clone();
    match state.orchestrator.handle_callback(platform, query).await {
        Ok(outcome) => {
            let target = match &outcome.state.link_token {
                Some(link) => format!("{}/onboard/{}?connected={}", base, link, platform.slug()),
                None => format!("{}/?connected={}", base, platform.slug()),
            };
            Redirect::temporary(&target)
        }
        Err(err) => {
            warn!(platform = %platform, error = %err, "oauth callback failed");
            // A client flow that failed after a decodable state still lands
            // back on its onboarding page, keeping the session visible.
            let link = raw_state
                .as_deref()
                .and_then(|raw| StateToken::decode(raw).ok())
                .and_then(|token| token.link_token);
            let target = match link {
                Some(link) => format!("{}/onboard/{}?error={}", base, link, err.redirect_code()),
                None => format!("{}/?error={}", base, err.redirect_code()),
            };
            Redirect::temporary(&target)
        }
    }
}

/// Request body for the manual Shopify connection path.
#[derive(Debug, Deserialize)]
pub struct ConnectStoreRequest {
    pub owner_id: String,
    #[serde(default = "default_owner_kind")]
    pub owner_kind: OwnerKind,
    pub store_domain: String,
    pub collaborator_code: String,
}

/// Create a Shopify connection from a store domain and collaborator code.
pub async fn connect_shopify_store(
    State(state): State<AppState>,
    Json(body): Json<ConnectStoreRequest>,
) -> Result<(StatusCode, Json<ConnectionInfo>), ApiError> {
    let owner = Owner {
        id: body.owner_id,
        kind: body.owner_kind,
    };
    let connection = state
        .orchestrator
        .connect_store(owner, &body.store_domain, &body.collaborator_code)
        .await?;
    Ok((StatusCode::CREATED, Json(ConnectionInfo::from(connection))))
}
