// HTTP data source for user-configured analytics APIs
use crate::application::data_source::{DataSource, FetchError};
use crate::domain::row::{Row, display_value};
use crate::domain::widget::DataRequest;
use crate::infrastructure::config::FetchSettings;
use crate::infrastructure::envelope::{incompatible_parameters, normalize};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::{Value, json};
use std::time::Duration;

/// An API key of the form `KEY&max_age=SECONDS` carries a cache max-age.
pub const MAX_AGE_MARKER: &str = "&max_age=";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&FetchSettings::default())
    }
}

impl From<&FetchSettings> for FetchPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl HttpDataSource {
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    async fn fetch_once(&self, request: &DataRequest) -> Result<Vec<Row>, FetchError> {
        let mut url = parse_endpoint(&request.endpoint)?;
        apply_api_key(&mut url, request.api_key.as_deref());

        let builder = if is_parameterized_query(&url) && !request.parameters.is_empty() {
            tracing::debug!("POST {} with {} parameters", url, request.parameters.len());
            self.client
                .post(url)
                .json(&json!({ "parameters": request.parameters }))
        } else {
            if !request.parameters.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in &request.parameters {
                    pairs.append_pair(name, &display_value(value));
                }
            }
            tracing::debug!("GET {}", url);
            self.client.get(url)
        };

        let exchange = async {
            let response = builder
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(network_error)?;
            let status = response.status();
            let body = response.text().await.map_err(network_error)?;
            Ok::<(StatusCode, String), FetchError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.policy.timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !status.is_success() {
            if let Some(message) = incompatible_parameters(&body) {
                return Err(FetchError::IncompatibleParameters { message });
            }
            return Err(FetchError::HttpError {
                status: status.as_u16(),
            });
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::InvalidBody(e.to_string()))?;
        normalize(&parsed)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch(&self, request: &DataRequest) -> Result<Vec<Row>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(request).await {
                Ok(rows) => {
                    tracing::debug!("Fetched {} rows from {}", rows.len(), request.endpoint);
                    return Ok(rows);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff_base * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        "Fetch from {} failed ({}), retrying in {:?}",
                        request.endpoint,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Fetch from {} failed: {}", request.endpoint, e);
                    return Err(e);
                }
            }
        }
    }
}

fn network_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, FetchError> {
    let url = Url::parse(endpoint.trim()).map_err(|e| FetchError::InvalidUrl {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: endpoint.to_string(),
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

/// Append `api_key` (and `max_age` when the key embeds one).
pub fn apply_api_key(url: &mut Url, api_key: Option<&str>) {
    let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) else {
        return;
    };
    let mut pairs = url.query_pairs_mut();
    match key.split_once(MAX_AGE_MARKER) {
        Some((base, max_age)) => {
            pairs.append_pair("api_key", base);
            pairs.append_pair("max_age", max_age);
        }
        None => {
            pairs.append_pair("api_key", key);
        }
    }
}

/// Saved-query endpoints (`/api/queries/{id}/results`) take filters as a POST body.
pub fn is_parameterized_query(url: &Url) -> bool {
    let path = url.path().trim_end_matches('/');
    path.contains("/api/queries/") && path.ends_with("/results")
}
