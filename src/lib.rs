//! Tootherd - keeps categorized Mastodon accounts followed and listed,
//! and caches their live toots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scheduler (tokio tasks)                     │
//! │  - one reconciliation worker per category                   │
//! │  - one stream listener per stream source                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Engine Layer                            │
//! │  - List Reconciliation Engine                               │
//! │  - Live Content Cache                                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Client / Data Layer                        │
//! │  - Mastodon REST + streaming client (reqwest)               │
//! │  - Flat-file record store (atomic JSON records)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `reconcile`: drives follows + list membership toward the category map
//! - `cache`: deduplicated, time-windowed toot cache + stream listener
//! - `client`: `AccountClient` trait and the Mastodon implementation
//! - `data`: typed records and the flat-file record store
//! - `scheduler`: per-category / per-stream worker loops
//! - `api`: health and metrics endpoints
//! - `config`: configuration management
//! - `error`: error types

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod reconcile;
pub mod scheduler;

use std::sync::Arc;

/// Application state shared across workers and handlers
///
/// Cloned per worker; all members are cheap `Arc` handles.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Flat-file record store (accounts + toots)
    pub store: Arc<data::RecordStore>,

    /// Live content cache over the store's toot namespace
    pub cache: Arc<cache::ContentCache>,

    /// Authenticated Mastodon client
    pub client: Arc<client::MastodonClient>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Open the record store
    /// 2. Build the HTTP client
    /// 3. Connect to the Mastodon instance (verifies the token)
    /// 4. Build the content cache
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Open the record store
        tokio::fs::create_dir_all(&config.store.root)
            .await
            .map_err(data::StoreError::from)?;
        let store = Arc::new(data::RecordStore::new(&config.store.root));
        tracing::info!(root = %config.store.root.display(), "Record store opened");

        // 2. Build the HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("Tootherd/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        // 3. Connect to the Mastodon instance
        let client = client::MastodonClient::connect(
            http_client,
            &config.mastodon.base_url,
            &config.mastodon.access_token,
        )
        .await?;
        tracing::info!(instance = %config.mastodon.base_url, "Mastodon client connected");

        // 4. Build the content cache
        let cache = cache::ContentCache::new(store.clone());

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            store,
            cache: Arc::new(cache),
            client: Arc::new(client),
        })
    }
}

/// Build the Axum router.
///
/// Observability only: `/health` and `/metrics`.
pub fn build_router() -> axum::Router {
    use tower_http::trace::TraceLayer;

    api::observability_router().layer(TraceLayer::new_for_http())
}
