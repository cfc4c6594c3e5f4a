//! # Error Handling
//!
//! Two layers, matching how failures propagate:
//!
//! * [`ConnectError`] is the engine taxonomy. Asset-fetch failures are
//!   downgraded to partial results at per-asset-kind granularity before they
//!   ever reach this type; exchange and persistence failures are not.
//! * [`ApiError`] is the unified problem+json response for the HTTP surface,
//!   with a correlation id for log matching.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::model::{AssetKind, Platform};
use crate::store::StoreError;

/// Engine-level error taxonomy.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The user declined consent at the provider. Terminal; the caller
    /// redirects back with a reason code and never retries.
    #[error("authorization denied by user: {reason}")]
    OAuthDenied { reason: String },

    /// The provider rejected the code/secret/redirect. Terminal for this
    /// attempt; authorization codes are single-use.
    #[error("token exchange failed for {platform}: {detail}")]
    TokenExchangeFailed { platform: Platform, detail: String },

    /// A non-recoverable provider failure while listing assets (expired
    /// token, network down). Per-asset-kind partial failures never surface
    /// here; they are recorded inside the fetch outcome instead.
    #[error("asset fetch failed for {platform}: {detail}")]
    AssetFetchFailed {
        platform: Platform,
        kind: Option<AssetKind>,
        detail: String,
    },

    /// Repair or validity-probe target missing. Skipped and reported.
    #[error("connection {0} not found")]
    ConnectionNotFound(uuid::Uuid),

    #[error("unknown or unconfigured platform '{0}'")]
    UnknownPlatform(String),

    /// Callback state failed to decode or did not match a known flow.
    #[error("invalid oauth state: {0}")]
    InvalidState(String),

    #[error("onboarding link rejected: {0}")]
    LinkRejected(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl ConnectError {
    /// Short machine code used in user-facing `?error=` redirects.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            ConnectError::OAuthDenied { .. } => "access_denied",
            ConnectError::TokenExchangeFailed { .. } => "exchange_failed",
            ConnectError::AssetFetchFailed { .. } => "asset_fetch_failed",
            ConnectError::ConnectionNotFound(_) => "connection_not_found",
            ConnectError::UnknownPlatform(_) => "unknown_platform",
            ConnectError::InvalidState(_) => "invalid_state",
            ConnectError::LinkRejected(_) => "link_rejected",
            ConnectError::Validation(_) => "invalid_request",
            ConnectError::Persistence(_) => "internal_error",
        }
    }
}

/// Unified API error response structure (problem+json).
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip_serializing)]
    pub status: StatusCode,
    pub code: Box<str>,
    pub message: Box<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Some(correlation_id().into_boxed_str()),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }
}

/// Correlation id for basic client-server log matching.
fn correlation_id() -> String {
    format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8])
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );
        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<ConnectError> for ApiError {
    fn from(error: ConnectError) -> Self {
        match &error {
            ConnectError::OAuthDenied { reason } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "OAUTH_DENIED".to_string(),
                format!("authorization denied: {}", reason),
            ),
            ConnectError::TokenExchangeFailed { platform, detail } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "TOKEN_EXCHANGE_FAILED".to_string(),
                format!("provider {} rejected the code exchange: {}", platform, detail),
            ),
            ConnectError::AssetFetchFailed { platform, .. } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "ASSET_FETCH_FAILED".to_string(),
                format!("provider {} asset fetch failed", platform),
            ),
            ConnectError::ConnectionNotFound(id) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND".to_string(),
                format!("connection {} not found", id),
            ),
            ConnectError::UnknownPlatform(name) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND".to_string(),
                format!("platform '{}' not found", name),
            ),
            ConnectError::InvalidState(detail) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED".to_string(),
                format!("invalid oauth state: {}", detail),
            ),
            ConnectError::LinkRejected(detail) => ApiError::new(
                StatusCode::GONE,
                "LINK_REJECTED".to_string(),
                format!("onboarding link rejected: {}", detail),
            ),
            ConnectError::Validation(detail) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED".to_string(),
                detail.clone(),
            ),
            ConnectError::Persistence(err) => {
                tracing::error!(error = %err, "persistence failure surfaced to API");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE".to_string(),
                    "persistence unavailable".to_string(),
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("internal error: {:?}", error);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "an internal error occurred",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_codes_are_stable() {
        let denied = ConnectError::OAuthDenied {
            reason: "access_denied".into(),
        };
        assert_eq!(denied.redirect_code(), "access_denied");

        let failed = ConnectError::TokenExchangeFailed {
            platform: Platform::Meta,
            detail: "400".into(),
        };
        assert_eq!(failed.redirect_code(), "exchange_failed");
    }

    #[test]
    fn api_error_sets_problem_json_content_type() {
        let error = ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "nope");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn connect_error_maps_to_status() {
        let api: ApiError = ConnectError::UnknownPlatform("x".into()).into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);

        let api: ApiError = ConnectError::TokenExchangeFailed {
            platform: Platform::Google,
            detail: "invalid_grant".into(),
        }
        .into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert!(api.trace_id.is_some());
    }
}
