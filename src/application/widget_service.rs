// Widget service - Use case for loading and transforming one widget's data
use crate::application::config_repository::StoreError;
use crate::application::config_service::ConfigService;
use crate::application::data_source::DataSource;
use crate::application::transform::chart::build_chart;
use crate::application::transform::counter::build_counter;
use crate::application::transform::table::{build_table, paginate};
use crate::domain::load_state::{LoadState, LoadTracker, NextStep, RetryPolicy};
use crate::domain::row::Row;
use crate::domain::visual::{ChartModel, CounterModel, TablePage, WidgetModel};
use crate::domain::widget::{ResourceKind, WidgetConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct WidgetQuery {
    pub refresh: bool,
    pub search: Option<String>,
    pub page: Option<usize>,
}

/// Model as served to clients; tables are filtered and paged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewModel {
    Chart(ChartModel),
    Table(TablePage),
    Counter(CounterModel),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetView {
    pub id: String,
    pub title: String,
    pub state: LoadState,
    /// Last successfully loaded model, kept while a reload is failing.
    pub model: Option<ViewModel>,
    pub error: Option<String>,
    pub retry_in_ms: Option<u64>,
}

struct SlotState {
    tracker: LoadTracker,
    config: Option<WidgetConfig>,
    model: Option<WidgetModel>,
}

/// State is locked only to read or record progress; the gate is held for
/// the whole load, backoff sleeps included.
struct WidgetSlot {
    state: Mutex<SlotState>,
    load_gate: Mutex<()>,
}

type SlotKey = (ResourceKind, String);

#[derive(Clone)]
pub struct WidgetService {
    configs: ConfigService,
    source: Arc<dyn DataSource>,
    policy: RetryPolicy,
    slots: Arc<Mutex<HashMap<SlotKey, Arc<WidgetSlot>>>>,
}

impl WidgetService {
    pub fn new(configs: ConfigService, source: Arc<dyn DataSource>, policy: RetryPolicy) -> Self {
        Self {
            configs,
            source,
            policy,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current view of a widget, loading its data first when due.
    ///
    /// One load runs per widget at a time. Callers arriving while it runs
    /// get the current state and the last good model without waiting.
    pub async fn view(
        &self,
        kind: ResourceKind,
        id: &str,
        query: &WidgetQuery,
    ) -> Result<WidgetView, StoreError> {
        let config = self.configs.cached(kind, id).await?;
        let slot = self.slot(kind, id).await;

        if load_due(&*slot.state.lock().await, &config, query) {
            match slot.load_gate.try_lock() {
                Ok(_gate) => {
                    // A load may have finished between the check and the gate.
                    if load_due(&*slot.state.lock().await, &config, query) {
                        self.load(&config, &slot.state).await;
                    }
                }
                Err(_) => tracing::debug!("{} {} is already loading", kind, id),
            }
        }

        let state = slot.state.lock().await;
        Ok(render(&config, &state, query))
    }

    /// Drop the load state of a deleted widget.
    pub async fn forget(&self, kind: ResourceKind, id: &str) {
        self.slots.lock().await.remove(&(kind, id.to_string()));
    }

    async fn slot(&self, kind: ResourceKind, id: &str) -> Arc<WidgetSlot> {
        self.slots
            .lock()
            .await
            .entry((kind, id.to_string()))
            .or_insert_with(|| {
                Arc::new(WidgetSlot {
                    state: Mutex::new(SlotState {
                        tracker: LoadTracker::new(self.policy),
                        config: None,
                        model: None,
                    }),
                    load_gate: Mutex::new(()),
                })
            })
            .clone()
    }

    async fn load(&self, config: &WidgetConfig, state: &Mutex<SlotState>) {
        let request = config.data_request();
        loop {
            state.lock().await.tracker.begin(Instant::now());
            let result = self.source.fetch(&request).await;

            match result {
                Ok(rows) => {
                    tracing::debug!("Loaded {} rows for {} {}", rows.len(), config.kind(), config.id());
                    let model = transform(config, &rows);
                    let mut slot = state.lock().await;
                    slot.model = Some(model);
                    slot.config = Some(config.clone());
                    slot.tracker.succeed(Instant::now());
                    return;
                }
                Err(e) => {
                    let mut slot = state.lock().await;
                    match slot.tracker.fail(e.to_string()) {
                        NextStep::RetryAfter(delay) => {
                            drop(slot);
                            tracing::warn!(
                                "Loading {} {} failed ({}), retrying in {:?}",
                                config.kind(),
                                config.id(),
                                e,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        NextStep::AutoRetryEvery(interval) => {
                            tracing::error!(
                                "Loading {} {} failed ({}), retrying every {:?}",
                                config.kind(),
                                config.id(),
                                e,
                                interval
                            );
                            slot.config = Some(config.clone());
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn load_due(state: &SlotState, config: &WidgetConfig, query: &WidgetQuery) -> bool {
    let auto_refresh = config.refresh_interval_secs().map(Duration::from_secs);
    state.config.as_ref() != Some(config)
        || state.tracker.should_load(Instant::now(), query.refresh, auto_refresh)
}

fn transform(config: &WidgetConfig, rows: &[Row]) -> WidgetModel {
    match config {
        WidgetConfig::Chart(c) => WidgetModel::Chart(build_chart(rows, c)),
        WidgetConfig::Table(c) => WidgetModel::Table(build_table(rows, c)),
        WidgetConfig::Counter(c) => WidgetModel::Counter(build_counter(rows, c)),
    }
}

fn render(config: &WidgetConfig, slot: &SlotState, query: &WidgetQuery) -> WidgetView {
    let model = slot.model.as_ref().map(|model| match (model, config) {
        (WidgetModel::Table(table), WidgetConfig::Table(c)) => ViewModel::Table(paginate(
            table,
            query.search.as_deref().unwrap_or(""),
            query.page.unwrap_or(1),
            c.rows_per_page,
        )),
        (WidgetModel::Table(table), _) => {
            ViewModel::Table(paginate(table, query.search.as_deref().unwrap_or(""), 1, 0))
        }
        (WidgetModel::Chart(chart), _) => ViewModel::Chart(chart.clone()),
        (WidgetModel::Counter(counter), _) => ViewModel::Counter(counter.clone()),
    });

    WidgetView {
        id: config.id().to_string(),
        title: config.title().to_string(),
        state: slot.tracker.state(),
        model,
        error: slot.tracker.last_error().map(str::to_string),
        retry_in_ms: slot
            .tracker
            .retry_in(Instant::now())
            .map(|d| d.as_millis() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config_cache::{CacheTtl, ConfigCache};
    use crate::application::data_source::FetchError;
    use crate::application::testing::{FakeRepository, ScriptedSource, chart, rows};
    use crate::infrastructure::local_store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            backoff_base: Duration::from_millis(1),
            auto_retry_interval: Duration::from_secs(30),
        }
    }

    fn service(
        repository: Arc<FakeRepository>,
        source: Arc<ScriptedSource>,
    ) -> (ConfigService, WidgetService) {
        let cache = ConfigCache::new(
            repository.clone(),
            Arc::new(MemoryStore::new()),
            CacheTtl::default(),
        );
        let configs = ConfigService::new(repository, cache, Vec::new());
        (configs.clone(), WidgetService::new(configs, source, policy()))
    }

    fn volume_rows() -> Vec<Row> {
        rows(json!([
            {"date": "2024-01-02", "value": 5},
            {"date": "2024-01-01", "value": 3}
        ]))
    }

    #[tokio::test]
    async fn test_success_is_served_until_refresh() {
        let repository = Arc::new(FakeRepository::with(vec![chart("c1", "home")]));
        let source = Arc::new(ScriptedSource::new(vec![Ok(volume_rows())]));
        let (_, service) = service(repository, source.clone());

        let view = service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();
        assert_eq!(view.state, LoadState::Success);
        let Some(ViewModel::Chart(model)) = view.model else {
            panic!("expected a chart model");
        };
        assert_eq!(model.points[0]["date"], "2024-01-01");

        service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let refresh = WidgetQuery {
            refresh: true,
            ..WidgetQuery::default()
        };
        service.view(ResourceKind::Charts, "c1", &refresh).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_end_in_auto_retry_then_recover() {
        let repository = Arc::new(FakeRepository::with(vec![chart("c1", "home")]));
        let source = Arc::new(ScriptedSource::new(vec![
            Err(FetchError::HttpError { status: 500 }),
            Err(FetchError::Timeout),
            Ok(volume_rows()),
        ]));
        let (_, service) = service(repository, source.clone());

        let view = service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();
        assert_eq!(view.state, LoadState::AutoRetrying);
        assert_eq!(view.error.as_deref(), Some("Request timed out"));
        assert!(view.retry_in_ms.is_some_and(|ms| ms > 0 && ms <= 30_000));
        assert!(view.model.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // Not due yet: no new attempt.
        service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let refresh = WidgetQuery {
            refresh: true,
            ..WidgetQuery::default()
        };
        let view = service.view(ResourceKind::Charts, "c1", &refresh).await.unwrap();
        assert_eq!(view.state, LoadState::Success);
        assert_eq!(view.error, None);
        assert_eq!(view.retry_in_ms, None);
    }

    #[tokio::test]
    async fn test_incompatible_parameters_are_surfaced() {
        let repository = Arc::new(FakeRepository::with(vec![chart("c1", "home")]));
        let source = Arc::new(ScriptedSource::new(vec![Err(
            FetchError::IncompatibleParameters {
                message: "start_date is not a date".to_string(),
            },
        )]));
        let (_, service) = service(repository, source);

        let view = service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();
        assert!(view.error.unwrap().contains("start_date is not a date"));
    }

    #[tokio::test]
    async fn test_table_views_are_searched_and_paged() {
        let table = WidgetConfig::from_value(
            ResourceKind::Tables,
            json!({
                "id": "t1",
                "title": "Pools",
                "page": "defi",
                "apiEndpoint": "https://analytics.example.com/api/pools",
                "columns": [{"field": "pool"}, {"field": "tvl", "header": "TVL"}],
                "rowsPerPage": 2
            }),
        )
        .unwrap();
        let data = rows(json!([
            {"pool": "ETH/USDC", "tvl": 10},
            {"pool": "ETH/DAI", "tvl": 8},
            {"pool": "BTC/USDC", "tvl": 6},
            {"pool": "ETH/USDT", "tvl": 4}
        ]));
        let repository = Arc::new(FakeRepository::with(vec![table]));
        let (_, service) = service(repository, Arc::new(ScriptedSource::new(vec![Ok(data)])));

        let query = WidgetQuery {
            search: Some("eth".to_string()),
            page: Some(2),
            ..WidgetQuery::default()
        };
        let view = service.view(ResourceKind::Tables, "t1", &query).await.unwrap();
        let Some(ViewModel::Table(page)) = view.model else {
            panic!("expected a table page");
        };
        assert_eq!(page.total_rows, 3);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0]["pool"], "ETH/USDT");
    }

    #[tokio::test]
    async fn test_config_change_triggers_reload() {
        let repository = Arc::new(FakeRepository::with(vec![chart("c1", "home")]));
        let source = Arc::new(ScriptedSource::new(vec![Ok(volume_rows())]));
        let (configs, service) = service(repository, source.clone());

        service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();

        let WidgetConfig::Chart(mut updated) = chart("c1", "home") else {
            unreachable!()
        };
        updated.title = "Daily volume".to_string();
        configs.save(WidgetConfig::Chart(updated)).await.unwrap();

        let view = service
            .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
            .await
            .unwrap();
        assert_eq!(view.title, "Daily volume");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_views_reuse_cached_config() {
        let repository = Arc::new(FakeRepository::with(vec![chart("c1", "home")]));
        let source = Arc::new(ScriptedSource::new(vec![Ok(volume_rows())]));
        let (_, service) = service(repository.clone(), source);

        for _ in 0..2 {
            service
                .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
                .await
                .unwrap();
        }
        assert_eq!(repository.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_viewers_do_not_wait_for_running_load() {
        let repository = Arc::new(FakeRepository::with(vec![chart("c1", "home")]));
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(volume_rows())]).delayed(Duration::from_millis(200)),
        );
        let (_, service) = service(repository, source.clone());

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .view(ResourceKind::Charts, "c1", &WidgetQuery::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let view = tokio::time::timeout(
            Duration::from_millis(100),
            service.view(ResourceKind::Charts, "c1", &WidgetQuery::default()),
        )
        .await
        .expect("second viewer waited for the load")
        .unwrap();
        assert_eq!(view.state, LoadState::Loading);
        assert!(view.model.is_none());

        let view = first.await.unwrap().unwrap();
        assert_eq!(view.state, LoadState::Success);
        assert!(view.model.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_widget_is_not_found() {
        let (_, service) = service(
            Arc::new(FakeRepository::default()),
            Arc::new(ScriptedSource::new(Vec::new())),
        );
        let err = service
            .view(ResourceKind::Counters, "missing", &WidgetQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
