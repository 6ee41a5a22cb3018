// In-memory fakes shared by the application layer tests
use crate::application::config_repository::{ConfigRepository, Persisted, StoreError};
use crate::application::data_source::{DataSource, FetchError};
use crate::domain::row::Row;
use crate::domain::widget::{
    ChartConfig, ChartType, DataRequest, ResourceKind, WidgetConfig,
};
use async_trait::async_trait;
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn chart(id: &str, page: &str) -> WidgetConfig {
    WidgetConfig::Chart(ChartConfig {
        id: id.to_string(),
        title: format!("Chart {}", id),
        page: page.to_string(),
        width: None,
        api_endpoint: "https://analytics.example.com/api/volume".to_string(),
        api_key: None,
        parameters: Map::new(),
        chart_type: ChartType::Bar,
        x_field: "date".to_string(),
        y_fields: vec!["value".to_string()],
        group_by: None,
        stacked: false,
        distinct_colors: false,
        colors: None,
        refresh_interval_secs: None,
    })
}

#[derive(Default)]
pub struct FakeRepository {
    configs: Mutex<Vec<WidgetConfig>>,
    delay: Option<Duration>,
    pub fail: AtomicBool,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl FakeRepository {
    pub fn with(configs: Vec<WidgetConfig>) -> Self {
        Self {
            configs: Mutex::new(configs),
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StoreError::Remote("store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn snapshot(&self) -> Vec<WidgetConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigRepository for FakeRepository {
    async fn list_all(&self, kind: ResourceKind) -> Result<Vec<WidgetConfig>, StoreError> {
        self.check()?;
        Ok(self.snapshot().into_iter().filter(|c| c.kind() == kind).collect())
    }

    async fn list_for_page(
        &self,
        kind: ResourceKind,
        page_id: &str,
    ) -> Result<Vec<WidgetConfig>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // Read before the delay, like a store answering from a point-in-time view.
        let configs: Vec<WidgetConfig> = self
            .snapshot()
            .into_iter()
            .filter(|c| c.kind() == kind && c.page() == page_id)
            .collect();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        Ok(configs)
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<WidgetConfig>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .snapshot()
            .into_iter()
            .find(|c| c.kind() == kind && c.id() == id))
    }

    async fn save(&self, config: &WidgetConfig) -> Result<Persisted, StoreError> {
        self.check()?;
        let mut configs = self.configs.lock().unwrap();
        configs.retain(|c| !(c.kind() == config.kind() && c.id() == config.id()));
        configs.push(config.clone());
        Ok(Persisted::Remote)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Persisted, StoreError> {
        self.check()?;
        self.configs
            .lock()
            .unwrap()
            .retain(|c| !(c.kind() == kind && c.id() == id));
        Ok(Persisted::Remote)
    }
}

/// Replays scripted responses, then keeps returning the last one.
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Vec<Row>, FetchError>>>,
    last: Mutex<Option<Result<Vec<Row>, FetchError>>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<Vec<Row>, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch(&self, _request: &DataRequest) -> Result<Vec<Row>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone().unwrap_or(Ok(Vec::new()))
    }
}

pub fn rows(value: serde_json::Value) -> Vec<Row> {
    serde_json::from_value(value).unwrap()
}
