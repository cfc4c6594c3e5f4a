//! # Onboard Connectors Library
//!
//! OAuth connection and asset synchronization engine for the onboarding
//! portal: platform adapters, token lifecycle, asset normalization, and
//! idempotent connection reconciliation.

pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod oauth;
pub mod platforms;
pub mod reconciler;
pub mod server;
pub mod store;
