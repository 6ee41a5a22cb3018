// Config cache - per-page widget configs with TTL, de-duplication and stale fallback
use crate::application::cache_store::{CacheEntry, CacheStore};
use crate::application::config_repository::{ConfigRepository, StoreError};
use crate::domain::widget::{ResourceKind, WidgetConfig};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<WidgetConfig>, String>>>;

/// Lifetime of cached configs per resource kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtl {
    pub charts: Duration,
    pub counters: Duration,
    pub tables: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            charts: Duration::from_secs(30 * 60),
            counters: Duration::from_secs(2 * 60),
            tables: Duration::from_secs(2 * 60),
        }
    }
}

impl CacheTtl {
    pub fn for_kind(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Charts => self.charts,
            ResourceKind::Counters => self.counters,
            ResourceKind::Tables => self.tables,
        }
    }
}

#[derive(Clone)]
pub struct ConfigCache {
    inner: Arc<Inner>,
}

/// Lock order: `generations`, then `in_flight`, then `memory`.
struct Inner {
    repository: Arc<dyn ConfigRepository>,
    store: Arc<dyn CacheStore>,
    ttl: CacheTtl,
    memory: Mutex<HashMap<String, CacheEntry>>,
    /// Bumped on every invalidation or explicit write of a key; a fetch only
    /// stores its result if the key's generation is unchanged since it started.
    generations: Mutex<HashMap<String, u64>>,
    in_flight: Mutex<HashMap<String, (u64, SharedFetch)>>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn decode<T: DeserializeOwned>(entry: &CacheEntry) -> Option<T> {
    serde_json::from_value(entry.payload.clone()).ok()
}

impl ConfigCache {
    pub fn new(
        repository: Arc<dyn ConfigRepository>,
        store: Arc<dyn CacheStore>,
        ttl: CacheTtl,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                store,
                ttl,
                memory: Mutex::new(HashMap::new()),
                generations: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fresh cached configs for a page, if any.
    pub async fn get(&self, kind: ResourceKind, page_id: &str) -> Option<Vec<WidgetConfig>> {
        self.inner.fresh(&kind.page_key(page_id)).await
    }

    /// Store the configs of a page. Supersedes any fetch of that page still in flight.
    pub async fn set(&self, kind: ResourceKind, page_id: &str, configs: &[WidgetConfig]) {
        let key = kind.page_key(page_id);
        let mut generations = self.inner.generations.lock().await;
        *generations.entry(key.clone()).or_insert(0) += 1;
        self.inner.in_flight.lock().await.remove(&key);
        self.inner.remember(&key, configs, self.inner.ttl.for_kind(kind)).await;
    }

    /// Drop the cached configs of one page so the next load goes to the store.
    pub async fn notify_invalidated(&self, kind: ResourceKind, page_id: &str) {
        self.inner.invalidate(&kind.page_key(page_id)).await;
    }

    /// Drop the cached copy of one widget config.
    pub async fn notify_config_changed(&self, kind: ResourceKind, id: &str) {
        self.inner.invalidate(&kind.item_key(id)).await;
    }

    pub async fn invalidate_page(&self, page_id: &str) {
        for kind in ResourceKind::ALL {
            self.notify_invalidated(kind, page_id).await;
        }
    }

    /// Configs for a page: cached when fresh, otherwise fetched once no matter
    /// how many callers ask concurrently. Never fails; a failed fetch yields
    /// the last good value (even expired) or an empty list.
    pub async fn load(
        &self,
        kind: ResourceKind,
        page_id: &str,
        force_refresh: bool,
    ) -> Vec<WidgetConfig> {
        if !force_refresh {
            if let Some(configs) = self.get(kind, page_id).await {
                tracing::debug!("Config cache hit for {}", kind.page_key(page_id));
                return configs;
            }
        }

        let fetch = self.shared_fetch(kind, page_id).await;
        match fetch.await {
            Ok(configs) => configs,
            Err(e) => {
                let stale: Option<Vec<WidgetConfig>> = self.inner.stale(&kind.page_key(page_id)).await;
                tracing::warn!(
                    "Failed to load {} for page {} ({}), serving {}",
                    kind,
                    page_id,
                    e,
                    if stale.is_some() { "stale cache" } else { "empty list" }
                );
                stale.unwrap_or_default()
            }
        }
    }

    /// One widget config, cached under its own key with the kind's TTL.
    /// A failed lookup falls back to the last cached copy, even expired.
    pub async fn config(&self, kind: ResourceKind, id: &str) -> Result<Option<WidgetConfig>, StoreError> {
        let key = kind.item_key(id);
        if let Some(config) = self.inner.fresh(&key).await {
            tracing::debug!("Config cache hit for {}", key);
            return Ok(Some(config));
        }

        let generation = self.inner.generation(&key).await;
        match self.inner.repository.get(kind, id).await {
            Ok(Some(config)) => {
                self.inner
                    .remember_if_current(&key, &config, self.inner.ttl.for_kind(kind), generation)
                    .await;
                Ok(Some(config))
            }
            Ok(None) => Ok(None),
            Err(e) => match self.inner.stale(&key).await {
                Some(config) => {
                    tracing::warn!("Failed to load {} ({}), serving stale cache", key, e);
                    Ok(Some(config))
                }
                None => Err(e),
            },
        }
    }

    async fn shared_fetch(&self, kind: ResourceKind, page_id: &str) -> SharedFetch {
        let key = kind.page_key(page_id);
        let generations = self.inner.generations.lock().await;
        let generation = generations.get(&key).copied().unwrap_or(0);
        let mut in_flight = self.inner.in_flight.lock().await;
        drop(generations);

        if let Some((started, existing)) = in_flight.get(&key) {
            if *started == generation {
                tracing::debug!("Joining in-flight config fetch {}", key);
                return existing.clone();
            }
        }

        let inner = self.inner.clone();
        let page = page_id.to_string();
        let fetch_key = key.clone();
        let fetch = async move {
            let result = inner
                .repository
                .list_for_page(kind, &page)
                .await
                .map_err(|e| e.to_string());
            if let Ok(configs) = &result {
                inner
                    .remember_if_current(&fetch_key, configs, inner.ttl.for_kind(kind), generation)
                    .await;
            }
            let mut in_flight = inner.in_flight.lock().await;
            if in_flight.get(&fetch_key).is_some_and(|(started, _)| *started == generation) {
                in_flight.remove(&fetch_key);
            }
            result
        }
        .boxed()
        .shared();

        in_flight.insert(key, (generation, fetch.clone()));
        fetch
    }
}

impl Inner {
    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.lock().await.get(key) {
            return Some(entry.clone());
        }

        let persisted: CacheEntry = serde_json::from_value(self.store.read(key).await?).ok()?;
        self.memory
            .lock()
            .await
            .insert(key.to_string(), persisted.clone());
        Some(persisted)
    }

    async fn fresh<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.lookup(key).await?;
        if entry.is_fresh(now_ms()) {
            decode(&entry)
        } else {
            None
        }
    }

    async fn stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        decode(&self.lookup(key).await?)
    }

    async fn generation(&self, key: &str) -> u64 {
        self.generations.lock().await.get(key).copied().unwrap_or(0)
    }

    async fn invalidate(&self, key: &str) {
        let mut generations = self.generations.lock().await;
        *generations.entry(key.to_string()).or_insert(0) += 1;
        self.in_flight.lock().await.remove(key);
        self.memory.lock().await.remove(key);
        if let Err(e) = self.store.remove(key).await {
            tracing::debug!("Ignoring cache removal failure for {}: {}", key, e);
        }
        tracing::debug!("Invalidated cached configs {}", key);
    }

    /// Store a fetch result unless the key was invalidated since `generation`.
    async fn remember_if_current<T: Serialize + ?Sized>(
        &self,
        key: &str,
        payload: &T,
        ttl: Duration,
        generation: u64,
    ) {
        let generations = self.generations.lock().await;
        if generations.get(key).copied().unwrap_or(0) != generation {
            tracing::debug!("Discarding outdated fetch result for {}", key);
            return;
        }
        self.remember(key, payload, ttl).await;
    }

    /// Callers hold the `generations` lock.
    async fn remember<T: Serialize + ?Sized>(&self, key: &str, payload: &T, ttl: Duration) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to encode configs for caching: {}", e);
                return;
            }
        };
        let entry = CacheEntry::new(payload, now_ms(), ttl.as_millis() as i64);

        match serde_json::to_value(&entry) {
            Ok(value) => {
                if let Err(e) = self.store.write(key, &value).await {
                    tracing::debug!("Ignoring persisted cache write failure for {}: {}", key, e);
                }
            }
            Err(e) => tracing::error!("Failed to encode cache entry {}: {}", key, e),
        }
        self.memory.lock().await.insert(key.to_string(), entry);
    }
}
