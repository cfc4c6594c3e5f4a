//! Configuration loading for the onboarding connection engine.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `ONBOARD_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `ONBOARD_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Public base URL of this service, used to build OAuth redirect URIs.
    #[serde(default = "default_base_app_url")]
    pub base_app_url: String,
    /// Per-request timeout for provider HTTP calls, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Maximum connections repaired concurrently in a batch.
    #[serde(default = "default_repair_concurrency")]
    pub repair_concurrency: u32,
    /// Wall-clock deadline for one repair batch, in seconds. Connections
    /// not yet fetching when it passes are reported as cancelled.
    #[serde(default = "default_repair_deadline_secs")]
    pub repair_deadline_secs: u64,
    /// Lead time before token expiry at which a token counts as stale, in seconds.
    #[serde(default = "default_token_lead_time_seconds")]
    pub token_lead_time_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_client_secret: Option<String>,
    #[serde(default = "default_meta_oauth_base")]
    pub meta_oauth_base: String,
    #[serde(default = "default_meta_api_base")]
    pub meta_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_client_secret: Option<String>,
    #[serde(default = "default_google_oauth_base")]
    pub google_oauth_base: String,
    #[serde(default = "default_google_api_base")]
    pub google_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok_client_secret: Option<String>,
    #[serde(default = "default_tiktok_oauth_base")]
    pub tiktok_oauth_base: String,
    #[serde(default = "default_tiktok_api_base")]
    pub tiktok_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopify_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopify_client_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            base_app_url: default_base_app_url(),
            provider_timeout_secs: default_provider_timeout_secs(),
            repair_concurrency: default_repair_concurrency(),
            repair_deadline_secs: default_repair_deadline_secs(),
            token_lead_time_seconds: default_token_lead_time_seconds(),
            meta_client_id: None,
            meta_client_secret: None,
            meta_oauth_base: default_meta_oauth_base(),
            meta_api_base: default_meta_api_base(),
            google_client_id: None,
            google_client_secret: None,
            google_oauth_base: default_google_oauth_base(),
            google_api_base: default_google_api_base(),
            tiktok_client_id: None,
            tiktok_client_secret: None,
            tiktok_oauth_base: default_tiktok_oauth_base(),
            tiktok_api_base: default_tiktok_api_base(),
            shopify_client_id: None,
            shopify_client_secret: None,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        for secret in [
            &mut config.meta_client_secret,
            &mut config.google_client_secret,
            &mut config.tiktok_client_secret,
            &mut config.shopify_client_secret,
        ] {
            if secret.is_some() {
                *secret = Some("[REDACTED]".to_string());
            }
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if settings are
    /// missing or out of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_timeout_secs == 0 || self.provider_timeout_secs > 60 {
            return Err(ConfigError::InvalidProviderTimeout {
                value: self.provider_timeout_secs,
            });
        }

        if self.repair_concurrency == 0 || self.repair_concurrency > 16 {
            return Err(ConfigError::InvalidRepairConcurrency {
                value: self.repair_concurrency,
            });
        }

        if self.repair_deadline_secs == 0 || self.repair_deadline_secs > 3600 {
            return Err(ConfigError::InvalidRepairDeadline {
                value: self.repair_deadline_secs,
            });
        }

        if self.token_lead_time_seconds > 86400 {
            return Err(ConfigError::InvalidTokenLeadTime {
                value: self.token_lead_time_seconds,
            });
        }

        if !self.base_app_url.starts_with("http://") && !self.base_app_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseAppUrl {
                value: self.base_app_url.clone(),
            });
        }

        // OAuth credentials are only mandatory outside local/test profiles;
        // local runs can exercise the manual Shopify path without any.
        if !matches!(self.profile.as_str(), "local" | "test") {
            for (platform, id, secret) in [
                ("meta", &self.meta_client_id, &self.meta_client_secret),
                ("google", &self.google_client_id, &self.google_client_secret),
                ("tiktok", &self.tiktok_client_id, &self.tiktok_client_secret),
            ] {
                if id.is_none() || secret.is_none() {
                    return Err(ConfigError::MissingOAuthCredentials {
                        platform: platform.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_base_app_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    12
}

fn default_repair_concurrency() -> u32 {
    4
}

fn default_repair_deadline_secs() -> u64 {
    300
}

fn default_token_lead_time_seconds() -> u64 {
    300
}

fn default_meta_oauth_base() -> String {
    "https://www.facebook.com".to_string()
}

fn default_meta_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_google_oauth_base() -> String {
    "https://accounts.google.com".to_string()
}

fn default_google_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_tiktok_oauth_base() -> String {
    "https://www.tiktok.com".to_string()
}

fn default_tiktok_api_base() -> String {
    "https://open.tiktokapis.com".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("base app url '{value}' must be an absolute http(s) URL; set ONBOARD_BASE_APP_URL")]
    InvalidBaseAppUrl { value: String },
    #[error("provider timeout must be between 1 and 60 seconds, got {value}")]
    InvalidProviderTimeout { value: u64 },
    #[error("repair concurrency must be between 1 and 16, got {value}")]
    InvalidRepairConcurrency { value: u32 },
    #[error("repair deadline must be between 1 and 3600 seconds, got {value}")]
    InvalidRepairDeadline { value: u64 },
    #[error("token lead time must not exceed 86400 seconds, got {value}")]
    InvalidTokenLeadTime { value: u64 },
    #[error(
        "{platform} OAuth credentials are missing; set ONBOARD_{platform}_CLIENT_ID and ONBOARD_{platform}_CLIENT_SECRET",
        platform = .platform.to_uppercase()
    )]
    MissingOAuthCredentials { platform: String },
}

/// Loads configuration using layered `.env` files and `ONBOARD_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration with `.env` layering; the process environment wins.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("ONBOARD_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let take = |layered: &mut BTreeMap<String, String>, key: &str| -> Option<String> {
            layered.remove(key).and_then(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        let profile = take(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let base_app_url = take(&mut layered, "BASE_APP_URL").unwrap_or_else(default_base_app_url);
        let provider_timeout_secs = take(&mut layered, "PROVIDER_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_provider_timeout_secs);
        let repair_concurrency = take(&mut layered, "REPAIR_CONCURRENCY")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_repair_concurrency);
        let repair_deadline_secs = take(&mut layered, "REPAIR_DEADLINE_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_repair_deadline_secs);
        let token_lead_time_seconds = take(&mut layered, "TOKEN_LEAD_TIME_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_token_lead_time_seconds);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            base_app_url,
            provider_timeout_secs,
            repair_concurrency,
            repair_deadline_secs,
            token_lead_time_seconds,
            meta_client_id: take(&mut layered, "META_CLIENT_ID"),
            meta_client_secret: take(&mut layered, "META_CLIENT_SECRET"),
            meta_oauth_base: take(&mut layered, "META_OAUTH_BASE")
                .unwrap_or_else(default_meta_oauth_base),
            meta_api_base: take(&mut layered, "META_API_BASE")
                .unwrap_or_else(default_meta_api_base),
            google_client_id: take(&mut layered, "GOOGLE_CLIENT_ID"),
            google_client_secret: take(&mut layered, "GOOGLE_CLIENT_SECRET"),
            google_oauth_base: take(&mut layered, "GOOGLE_OAUTH_BASE")
                .unwrap_or_else(default_google_oauth_base),
            google_api_base: take(&mut layered, "GOOGLE_API_BASE")
                .unwrap_or_else(default_google_api_base),
            tiktok_client_id: take(&mut layered, "TIKTOK_CLIENT_ID"),
            tiktok_client_secret: take(&mut layered, "TIKTOK_CLIENT_SECRET"),
            tiktok_oauth_base: take(&mut layered, "TIKTOK_OAUTH_BASE")
                .unwrap_or_else(default_tiktok_oauth_base),
            tiktok_api_base: take(&mut layered, "TIKTOK_API_BASE")
                .unwrap_or_else(default_tiktok_api_base),
            shopify_client_id: take(&mut layered, "SHOPIFY_CLIENT_ID"),
            shopify_client_secret: take(&mut layered, "SHOPIFY_CLIENT_SECRET"),
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("ONBOARD_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("ONBOARD_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
