// Config service - Use cases for managing widget configurations
use crate::application::config_cache::ConfigCache;
use crate::application::config_repository::{ConfigRepository, Persisted, StoreError};
use crate::domain::widget::{ResourceKind, WidgetConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct ConfigService {
    repository: Arc<dyn ConfigRepository>,
    cache: ConfigCache,
    pages: Vec<String>,
    /// Saves and deletes take this exclusively; full listings share it, so a
    /// listing never warms the cache with configs a concurrent mutation replaced.
    mutations: Arc<RwLock<()>>,
}

impl ConfigService {
    /// `pages` lists the known page ids; an empty list accepts any page.
    pub fn new(repository: Arc<dyn ConfigRepository>, cache: ConfigCache, pages: Vec<String>) -> Self {
        Self {
            repository,
            cache,
            pages,
            mutations: Arc::new(RwLock::new(())),
        }
    }

    /// Every config of a kind. The result also refreshes the cached page lists.
    pub async fn list_all(&self, kind: ResourceKind) -> Result<Vec<WidgetConfig>, StoreError> {
        let _listing = self.mutations.read().await;
        let configs = self.repository.list_all(kind).await?;

        let mut by_page: HashMap<&str, Vec<WidgetConfig>> = HashMap::new();
        for config in &configs {
            by_page.entry(config.page()).or_default().push(config.clone());
        }
        for (page, page_configs) in &by_page {
            self.cache.set(kind, page, page_configs).await;
        }
        Ok(configs)
    }

    pub async fn page_configs(
        &self,
        kind: ResourceKind,
        page_id: &str,
        refresh: bool,
    ) -> Vec<WidgetConfig> {
        self.cache.load(kind, page_id, refresh).await
    }

    pub async fn get(&self, kind: ResourceKind, id: &str) -> Result<WidgetConfig, StoreError> {
        self.repository
            .get(kind, id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    /// A config as the widget pipeline sees it: served from the cache while fresh.
    pub async fn cached(&self, kind: ResourceKind, id: &str) -> Result<WidgetConfig, StoreError> {
        self.cache
            .config(kind, id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    pub async fn save(&self, config: WidgetConfig) -> Result<Persisted, StoreError> {
        self.validate(&config)?;
        let _mutation = self.mutations.write().await;

        // A config moved to another page must disappear from the old page too.
        let previous_page = match self.repository.get(config.kind(), config.id()).await {
            Ok(Some(previous)) if previous.page() != config.page() => {
                Some(previous.page().to_string())
            }
            _ => None,
        };

        let persisted = self.repository.save(&config).await?;
        tracing::info!(
            "Saved {} config {} for page {} ({:?})",
            config.kind(),
            config.id(),
            config.page(),
            persisted
        );

        self.cache
            .notify_invalidated(config.kind(), config.page())
            .await;
        self.cache
            .notify_config_changed(config.kind(), config.id())
            .await;
        if let Some(page) = previous_page {
            self.cache.notify_invalidated(config.kind(), &page).await;
        }
        Ok(persisted)
    }

    pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Persisted, StoreError> {
        let _mutation = self.mutations.write().await;
        let page = match self.repository.get(kind, id).await {
            Ok(Some(existing)) => Some(existing.page().to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not look up {} config {} before delete: {}", kind, id, e);
                None
            }
        };

        let persisted = self.repository.delete(kind, id).await?;
        tracing::info!("Deleted {} config {} ({:?})", kind, id, persisted);

        if let Some(page) = page {
            self.cache.notify_invalidated(kind, &page).await;
        }
        self.cache.notify_config_changed(kind, id).await;
        Ok(persisted)
    }

    pub async fn invalidate_page(&self, page_id: &str) {
        self.cache.invalidate_page(page_id).await;
    }

    fn validate(&self, config: &WidgetConfig) -> Result<(), StoreError> {
        if config.id().trim().is_empty() {
            return Err(StoreError::Invalid("id must not be empty".to_string()));
        }
        if config.data_request().endpoint.trim().is_empty() {
            return Err(StoreError::Invalid("apiEndpoint must not be empty".to_string()));
        }
        if !self.pages.is_empty() && !self.pages.iter().any(|p| p == config.page()) {
            return Err(StoreError::UnknownPage {
                page: config.page().to_string(),
            });
        }
        Ok(())
    }
}
