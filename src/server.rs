//! # Server Configuration
//!
//! Axum router construction and the serve loop.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::handlers;
use crate::lifecycle::Lifecycle;
use crate::oauth::Orchestrator;
use crate::platforms::PlatformRegistry;
use crate::reconciler::Reconciler;
use crate::store::{ConnectionStore, MemoryStore};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ConnectionStore>,
    pub registry: PlatformRegistry,
    pub orchestrator: Orchestrator,
    pub reconciler: Reconciler,
    pub lifecycle: Lifecycle,
}

impl AppState {
    /// Wire all components from configuration and a store.
    pub fn new(config: AppConfig, store: Arc<dyn ConnectionStore>) -> Self {
        let registry = PlatformRegistry::from_config(&config);
        let reconciler = Reconciler::new(
            store.clone(),
            registry.clone(),
            config.repair_concurrency as usize,
        );
        let orchestrator = Orchestrator::new(
            registry.clone(),
            reconciler.clone(),
            store.clone(),
            config.base_app_url.clone(),
        );
        let lifecycle = Lifecycle::new(
            registry.clone(),
            store.clone(),
            config.token_lead_time_seconds,
        );
        Self {
            config: Arc::new(config),
            store,
            registry,
            orchestrator,
            reconciler,
            lifecycle,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/connect/shopify/store", post(handlers::connect_shopify_store))
        .route("/connect/{platform}", get(handlers::start_connect))
        .route(
            "/onboard/{link}/connect/{platform}",
            get(handlers::start_onboard_connect),
        )
        .route("/callback/{platform}", get(handlers::oauth_callback))
        .route("/connections", get(handlers::list_connections))
        .route("/repair", post(handlers::run_repair))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let store: Arc<dyn ConnectionStore> = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
