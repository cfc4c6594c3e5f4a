//! # Onboard Connectors Main Entry Point

use onboard_connectors::{config::ConfigLoader, logging::init_subscriber, server::run_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    init_subscriber(&config);

    tracing::info!(profile = %config.profile, "configuration loaded");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(config = %redacted_json, "effective configuration");
    }

    run_server(config).await
}
