// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::cache_store::CacheStore;
use crate::application::config_cache::ConfigCache;
use crate::application::config_service::ConfigService;
use crate::application::widget_service::WidgetService;
use crate::infrastructure::api_fetcher::{FetchPolicy, HttpDataSource};
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::http_config_repository::HttpConfigRepository;
use crate::infrastructure::local_store::{FileStore, MemoryStore};
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config().context("Failed to load configuration")?;

    // Local state (infrastructure layer)
    let store: Arc<dyn CacheStore> = match &config.store.local_dir {
        Some(dir) => {
            tracing::info!("Persisting cache and snapshots under {}", dir.display());
            Arc::new(FileStore::new(dir))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let repository = Arc::new(HttpConfigRepository::new(
        config.store.base_url.clone(),
        store.clone(),
        Duration::from_secs(config.store.timeout_secs),
    )?);
    let source = Arc::new(HttpDataSource::new(FetchPolicy::from(&config.fetch)));

    // Create services (application layer)
    let cache = ConfigCache::new(repository.clone(), store, config.cache.ttl());
    let config_service = ConfigService::new(repository, cache, config.store.pages.clone());
    let widget_service = WidgetService::new(
        config_service.clone(),
        source,
        config.load.retry_policy(),
    );

    let state = Arc::new(AppState {
        config_service,
        widget_service,
    });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!(
        "Starting analytics-dashboard on {} (config store {})",
        addr,
        config.store.base_url
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router).await?;

    Ok(())
}
