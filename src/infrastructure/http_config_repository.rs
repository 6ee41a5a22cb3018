// Config repository backed by the remote persistence API, with a local snapshot fallback
use crate::application::cache_store::{CacheStore, StorageError};
use crate::application::config_repository::{ConfigRepository, Persisted, StoreError};
use crate::domain::widget::{ResourceKind, WidgetConfig};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct HttpConfigRepository {
    client: reqwest::Client,
    base_url: String,
    snapshots: Arc<dyn CacheStore>,
    /// Serializes read-modify-write cycles on the `all_{kind}` snapshots.
    snapshot_lock: Arc<Mutex<()>>,
}

impl HttpConfigRepository {
    pub fn new(base_url: String, snapshots: Arc<dyn CacheStore>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build persistence API client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            snapshots,
            snapshot_lock: Arc::new(Mutex::new(())),
        })
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/api/{}", self.base_url, kind)
    }

    fn item_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), urlencoding::encode(id))
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!("GET {} returned {}", url, response.status())));
        }

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| StoreError::Remote(format!("Failed to parse {}: {}", url, e)))
    }

    async fn fetch_list(
        &self,
        kind: ResourceKind,
        page_id: Option<&str>,
    ) -> Result<Vec<WidgetConfig>, StoreError> {
        let url = self.collection_url(kind);
        let query: Vec<(&str, &str)> = page_id.map(|p| vec![("page", p)]).unwrap_or_default();
        let body = self.get_json(&url, &query).await?.unwrap_or(Value::Array(Vec::new()));
        decode_list(kind, &body)
    }

    async fn read_snapshot(&self, kind: ResourceKind) -> Option<Vec<WidgetConfig>> {
        let value = self.snapshots.read(&kind.snapshot_key()).await?;
        decode_list(kind, &value).ok()
    }

    async fn write_snapshot(&self, kind: ResourceKind, configs: &[WidgetConfig]) -> Result<(), StorageError> {
        let values = configs
            .iter()
            .map(WidgetConfig::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        self.snapshots
            .write(&kind.snapshot_key(), &Value::Array(values))
            .await
    }

    /// Apply a change to the local snapshot of one kind.
    async fn update_snapshot<F>(&self, kind: ResourceKind, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Vec<WidgetConfig>),
    {
        let _guard = self.snapshot_lock.lock().await;
        let mut configs = self.read_snapshot(kind).await.unwrap_or_default();
        change(&mut configs);
        self.write_snapshot(kind, &configs).await
    }

    async fn remote_save(&self, config: &WidgetConfig) -> Result<(), StoreError> {
        let body = config
            .to_value()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        let url = self.collection_url(config.kind());
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!("POST {} returned {}", url, response.status())));
        }
        Ok(())
    }

    async fn remote_delete(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError> {
        let url = self.item_url(kind, id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(StoreError::Remote(format!("DELETE {} returned {}", url, status)));
        }
        Ok(())
    }
}

/// Accept a bare array or an object wrapping it under the kind name or `data`.
fn decode_list(kind: ResourceKind, body: &Value) -> Result<Vec<WidgetConfig>, StoreError> {
    let items = body
        .as_array()
        .or_else(|| body.get(kind.as_str()).and_then(Value::as_array))
        .or_else(|| body.get("data").and_then(Value::as_array))
        .ok_or_else(|| StoreError::Remote(format!("Unexpected {} list shape", kind)))?;

    Ok(items
        .iter()
        .filter_map(|item| match WidgetConfig::from_value(kind, item.clone()) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Skipping malformed {} config: {}", kind, e);
                None
            }
        })
        .collect())
}

#[async_trait]
impl ConfigRepository for HttpConfigRepository {
    async fn list_all(&self, kind: ResourceKind) -> Result<Vec<WidgetConfig>, StoreError> {
        match self.fetch_list(kind, None).await {
            Ok(configs) => {
                let _guard = self.snapshot_lock.lock().await;
                if let Err(e) = self.write_snapshot(kind, &configs).await {
                    tracing::debug!("Could not refresh {} snapshot: {}", kind, e);
                }
                Ok(configs)
            }
            Err(e) => {
                let snapshot = self.read_snapshot(kind).await.ok_or(e)?;
                tracing::warn!("Persistence API unavailable, serving {} {} from snapshot", snapshot.len(), kind);
                Ok(snapshot)
            }
        }
    }

    async fn list_for_page(
        &self,
        kind: ResourceKind,
        page_id: &str,
    ) -> Result<Vec<WidgetConfig>, StoreError> {
        match self.fetch_list(kind, Some(page_id)).await {
            Ok(configs) => Ok(configs),
            Err(e) => {
                let snapshot = self.read_snapshot(kind).await.ok_or(e)?;
                tracing::warn!("Persistence API unavailable, serving page {} {} from snapshot", page_id, kind);
                Ok(snapshot.into_iter().filter(|c| c.page() == page_id).collect())
            }
        }
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<WidgetConfig>, StoreError> {
        match self.get_json(&self.item_url(kind, id), &[]).await {
            Ok(Some(body)) => WidgetConfig::from_value(kind, body)
                .map(Some)
                .map_err(|e| StoreError::Remote(format!("Malformed {} config {}: {}", kind, id, e))),
            Ok(None) => Ok(None),
            Err(e) => {
                let snapshot = self.read_snapshot(kind).await.ok_or(e)?;
                Ok(snapshot.into_iter().find(|c| c.id() == id))
            }
        }
    }

    async fn save(&self, config: &WidgetConfig) -> Result<Persisted, StoreError> {
        let remote = self.remote_save(config).await;
        let local = self
            .update_snapshot(config.kind(), |configs| {
                configs.retain(|c| c.id() != config.id());
                configs.push(config.clone());
            })
            .await;

        match (remote, local) {
            (Ok(()), _) => Ok(Persisted::Remote),
            (Err(e), Ok(())) => {
                tracing::warn!("Saved {} config {} locally only: {}", config.kind(), config.id(), e);
                Ok(Persisted::LocalFallback)
            }
            (Err(remote), Err(local)) => Err(StoreError::Unavailable(format!("{}; {}", remote, local))),
        }
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Persisted, StoreError> {
        let remote = self.remote_delete(kind, id).await;
        let local = self
            .update_snapshot(kind, |configs| configs.retain(|c| c.id() != id))
            .await;

        match (remote, local) {
            (Ok(()), _) => Ok(Persisted::Remote),
            (Err(e), Ok(())) => {
                tracing::warn!("Deleted {} config {} locally only: {}", kind, id, e);
                Ok(Persisted::LocalFallback)
            }
            (Err(remote), Err(local)) => Err(StoreError::Unavailable(format!("{}; {}", remote, local))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::chart;
    use crate::infrastructure::local_store::{FileStore, MemoryStore};
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    type Db = Arc<Mutex<Vec<Value>>>;

    async fn list(
        State(db): State<Db>,
        Path(_kind): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let items: Vec<Value> = db
            .lock()
            .await
            .iter()
            .filter(|c| query.get("page").is_none_or(|p| c["page"] == p.as_str()))
            .cloned()
            .collect();
        Json(json!({ "data": items }))
    }

    async fn create(State(db): State<Db>, Path(_kind): Path<String>, Json(body): Json<Value>) -> AxumStatus {
        let mut db = db.lock().await;
        db.retain(|c| c["id"] != body["id"]);
        db.push(body);
        AxumStatus::CREATED
    }

    async fn item(State(db): State<Db>, Path((_kind, id)): Path<(String, String)>) -> impl IntoResponse {
        match db.lock().await.iter().find(|c| c["id"] == id.as_str()) {
            Some(config) => Json(config.clone()).into_response(),
            None => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    async fn remove(State(db): State<Db>, Path((_kind, id)): Path<(String, String)>) -> AxumStatus {
        db.lock().await.retain(|c| c["id"] != id.as_str());
        AxumStatus::NO_CONTENT
    }

    async fn persistence_api() -> String {
        let db: Db = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/api/:kind", get(list).post(create))
            .route("/api/:kind/:id", get(item).delete(remove))
            .with_state(db);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn unreachable_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn repository(base_url: String, store: Arc<MemoryStore>) -> HttpConfigRepository {
        HttpConfigRepository::new(base_url, store, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let repo = repository(persistence_api().await, Arc::new(MemoryStore::new()));

        assert_eq!(repo.save(&chart("c1", "home")).await.unwrap(), Persisted::Remote);
        repo.save(&chart("c2", "defi")).await.unwrap();

        let home = repo.list_for_page(ResourceKind::Charts, "home").await.unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].id(), "c1");
        assert_eq!(repo.list_all(ResourceKind::Charts).await.unwrap().len(), 2);

        assert!(repo.get(ResourceKind::Charts, "c2").await.unwrap().is_some());
        repo.delete(ResourceKind::Charts, "c2").await.unwrap();
        assert!(repo.get(ResourceKind::Charts, "c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_falls_back_to_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let repo = repository(unreachable_url().await, store.clone());

        assert!(repo.list_for_page(ResourceKind::Charts, "home").await.is_err());

        assert_eq!(repo.save(&chart("c1", "home")).await.unwrap(), Persisted::LocalFallback);
        repo.save(&chart("c2", "defi")).await.unwrap();
        assert!(store.read("all_charts").await.is_some());

        let home = repo.list_for_page(ResourceKind::Charts, "home").await.unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(repo.get(ResourceKind::Charts, "c2").await.unwrap().unwrap().page(), "defi");

        assert_eq!(
            repo.delete(ResourceKind::Charts, "c1").await.unwrap(),
            Persisted::LocalFallback
        );
        assert!(repo.list_for_page(ResourceKind::Charts, "home").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_local_saves_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let repo = HttpConfigRepository::new(unreachable_url().await, store, Duration::from_secs(2)).unwrap();

        let saves = (0..8).map(|n| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.save(&chart(&format!("c{}", n), "home")).await })
        });
        for result in futures::future::join_all(saves).await {
            assert_eq!(result.unwrap().unwrap(), Persisted::LocalFallback);
        }

        let mut ids: Vec<String> = repo
            .list_all(ResourceKind::Charts)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, (0..8).map(|n| format!("c{}", n)).collect::<Vec<_>>());
    }

    #[test]
    fn test_decode_list_shapes() {
        let config = chart("c1", "home").to_value().unwrap();
        for body in [
            json!([config.clone()]),
            json!({"charts": [config.clone()]}),
            json!({"data": [config.clone(), {"broken": true}]}),
        ] {
            assert_eq!(decode_list(ResourceKind::Charts, &body).unwrap().len(), 1);
        }
        assert!(decode_list(ResourceKind::Charts, &json!({"ok": true})).is_err());
    }
}
