// HTTP request handlers
use crate::application::config_repository::{Persisted, StoreError};
use crate::application::widget_service::{WidgetQuery, WidgetView};
use crate::domain::widget::{ResourceKind, WidgetConfig};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::UnknownPage { .. } | StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::Remote(_) | StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!("{}", e);
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_kind(kind: &str) -> Result<ResourceKind, ApiError> {
    kind.parse().map_err(ApiError::bad_request)
}

#[derive(Deserialize, Default)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize, Default)]
pub struct DataQuery {
    #[serde(default)]
    pub refresh: bool,
    pub search: Option<String>,
    pub page: Option<usize>,
}

#[derive(Serialize)]
pub struct Saved {
    pub id: String,
    pub persisted: Persisted,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Configs of one kind on a page, served from the config cache
pub async fn page_configs(
    Path((page, kind)): Path<(String, String)>,
    Query(query): Query<RefreshQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WidgetConfig>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(
        state
            .config_service
            .page_configs(kind, &page, query.refresh)
            .await,
    ))
}

pub async fn invalidate_page(
    Path(page): Path<String>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    state.config_service.invalidate_page(&page).await;
    StatusCode::NO_CONTENT
}

pub async fn list_configs(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WidgetConfig>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.config_service.list_all(kind).await?))
}

pub async fn save_config(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Saved>, ApiError> {
    let kind = parse_kind(&kind)?;
    let config = WidgetConfig::from_value(kind, body)
        .map_err(|e| ApiError::bad_request(format!("Invalid {} config: {}", kind, e)))?;
    let id = config.id().to_string();
    let persisted = state.config_service.save(config).await?;
    Ok(Json(Saved { id, persisted }))
}

pub async fn get_config(
    Path((kind, id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<WidgetConfig>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.config_service.get(kind, &id).await?))
}

pub async fn delete_config(
    Path((kind, id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Saved>, ApiError> {
    let kind = parse_kind(&kind)?;
    let persisted = state.config_service.delete(kind, &id).await?;
    state.widget_service.forget(kind, &id).await;
    Ok(Json(Saved { id, persisted }))
}

/// Load state and transformed data of one widget
pub async fn widget_data(
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<DataQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<WidgetView>, ApiError> {
    let kind = parse_kind(&kind)?;
    let query = WidgetQuery {
        refresh: query.refresh,
        search: query.search,
        page: query.page,
    };
    Ok(Json(state.widget_service.view(kind, &id, &query).await?))
}
