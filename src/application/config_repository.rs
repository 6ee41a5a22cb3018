// Repository trait for widget configuration persistence
use crate::domain::widget::{ResourceKind, WidgetConfig};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Config store request failed: {0}")]
    Remote(String),

    #[error("Config store and local fallback are both unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown page {page}")]
    UnknownPage { page: String },

    #[error("{kind} config {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where a save or delete ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Persisted {
    Remote,
    LocalFallback,
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// All configs of a kind
    async fn list_all(&self, kind: ResourceKind) -> Result<Vec<WidgetConfig>, StoreError>;

    /// Configs of a kind placed on one page
    async fn list_for_page(
        &self,
        kind: ResourceKind,
        page_id: &str,
    ) -> Result<Vec<WidgetConfig>, StoreError>;

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<WidgetConfig>, StoreError>;

    /// Create or replace the config with the same id
    async fn save(&self, config: &WidgetConfig) -> Result<Persisted, StoreError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Persisted, StoreError>;
}
