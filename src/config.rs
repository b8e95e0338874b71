//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::data::Category;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mastodon: MastodonConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub reconcile: ReconcileConfig,
    pub stream: StreamConfig,
    /// Category name -> desired account handles/URLs, in order
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    pub logging: LoggingConfig,
}

/// Server configuration (health + metrics endpoints)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Mastodon instance and credentials
///
/// The access token is expected to exist already; app registration and
/// login are not this program's concern.
#[derive(Debug, Clone, Deserialize)]
pub struct MastodonConfig {
    /// Instance base URL (e.g., "https://mastodon.social")
    pub base_url: String,
    /// OAuth bearer token for the reconciling identity
    pub access_token: String,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Root directory for all persisted records
    pub root: PathBuf,
}

/// Content cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum toots returned per query (default: 40)
    pub max_items: usize,
    /// Retention window in seconds (default: 86400)
    pub retention_seconds: u64,
}

impl CacheConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between passes per category (default: 1800)
    pub interval_seconds: u64,
    /// Rate-limit cooldown before the single retry (default: 300)
    pub cooldown_seconds: u64,
    /// Recent toots captured per account snapshot (default: 5)
    pub recent_posts_limit: usize,
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

/// Stream ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Category names whose lists should be streamed into the cache
    #[serde(default)]
    pub sources: Vec<String>,
    /// Cooldown before reconnecting a dropped stream (default: 60)
    pub reconnect_seconds: u64,
}

impl StreamConfig {
    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (TOOTHERD_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("mastodon.base_url", "https://mastodon.social")?
            .set_default("store.root", "data")?
            .set_default("cache.max_items", 40)?
            .set_default("cache.retention_seconds", 86400)?
            .set_default("reconcile.interval_seconds", 1800)?
            .set_default("reconcile.cooldown_seconds", 300)?
            .set_default("reconcile.recent_posts_limit", 5)?
            .set_default("stream.reconnect_seconds", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (TOOTHERD_*)
            .add_source(
                Environment::with_prefix("TOOTHERD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Categories in deterministic (name) order
    pub fn categories(&self) -> Vec<Category> {
        self.categories
            .iter()
            .map(|(name, handles)| Category {
                name: name.clone(),
                handles: handles.clone(),
            })
            .collect()
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.mastodon.access_token.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "mastodon.access_token must be set".to_string(),
            ));
        }

        let base_url = url::Url::parse(&self.mastodon.base_url)
            .map_err(|e| crate::error::AppError::Config(format!("mastodon.base_url: {}", e)))?;
        if base_url.scheme() != "https" && base_url.scheme() != "http" {
            return Err(crate::error::AppError::Config(
                "mastodon.base_url must be an http(s) URL".to_string(),
            ));
        }

        if self.reconcile.interval_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "reconcile.interval_seconds must be greater than 0".to_string(),
            ));
        }

        for (name, handles) in &self.categories {
            if handles.iter().any(|h| h.trim().is_empty()) {
                return Err(crate::error::AppError::Config(format!(
                    "categories.{} contains an empty handle",
                    name
                )));
            }
        }

        for source in &self.stream.sources {
            if !self.categories.contains_key(source) {
                return Err(crate::error::AppError::Config(format!(
                    "stream.sources names unknown category \"{}\"",
                    source
                )));
            }
        }

        if self.categories.is_empty() {
            tracing::warn!("No categories configured; reconciliation has nothing to do");
        }

        Ok(())
    }
}
