use crate::application::config_cache::CacheTtl;
use crate::domain::load_state::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub load: LoadSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    /// Base URL of the persistence API serving `/api/{charts|counters|tables}`.
    #[serde(default = "default_store_url")]
    pub base_url: String,
    /// Directory for persisted cache entries and local snapshots; in-memory when unset.
    #[serde(default = "default_local_dir")]
    pub local_dir: Option<PathBuf>,
    /// Known page ids. Empty accepts any page.
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            local_dir: default_local_dir(),
            pages: Vec::new(),
            timeout_secs: default_store_timeout(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_local_dir() -> Option<PathBuf> {
    Some(PathBuf::from(".dashboard-cache"))
}

fn default_store_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_chart_ttl")]
    pub chart_ttl_secs: u64,
    #[serde(default = "default_short_ttl")]
    pub counter_ttl_secs: u64,
    #[serde(default = "default_short_ttl")]
    pub table_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            chart_ttl_secs: default_chart_ttl(),
            counter_ttl_secs: default_short_ttl(),
            table_ttl_secs: default_short_ttl(),
        }
    }
}

fn default_chart_ttl() -> u64 {
    30 * 60
}

fn default_short_ttl() -> u64 {
    2 * 60
}

impl CacheSettings {
    pub fn ttl(&self) -> CacheTtl {
        CacheTtl {
            charts: Duration::from_secs(self.chart_ttl_secs),
            counters: Duration::from_secs(self.counter_ttl_secs),
            tables: Duration::from_secs(self.table_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchSettings {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_retries: default_retries(),
            backoff_base_ms: default_backoff_ms(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    12
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    2_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoadSettings {
    #[serde(default = "default_load_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_auto_retry")]
    pub auto_retry_interval_secs: u64,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            max_retries: default_load_retries(),
            backoff_base_ms: default_backoff_ms(),
            auto_retry_interval_secs: default_auto_retry(),
        }
    }
}

fn default_load_retries() -> u32 {
    1
}

fn default_auto_retry() -> u64 {
    30
}

impl LoadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            auto_retry_interval: Duration::from_secs(self.auto_retry_interval_secs),
        }
    }
}

/// Load `config/dashboard.{toml,yaml,json}` when present, overridden by
/// `DASHBOARD__SECTION__KEY` environment variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("store.pages")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
