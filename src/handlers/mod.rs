//! # API Handlers
//!
//! Thin HTTP endpoint handlers. Flow logic lives in the orchestrator,
//! reconciler and lifecycle components; handlers translate between HTTP
//! and those components.

use axum::response::Json;
use serde::{Deserialize, Serialize};

pub mod connect;
pub mod connections;
pub mod repair;

pub use connect::{connect_shopify_store, oauth_callback, start_connect, start_onboard_connect};
pub use connections::list_connections;
pub use repair::run_repair;

/// Basic service information returned by the root endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "onboard-connectors".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Root handler that returns basic service information
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
