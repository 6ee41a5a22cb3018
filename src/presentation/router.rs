// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    delete_config, get_config, health_check, invalidate_page, list_configs, page_configs,
    save_config, widget_data,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/pages/:page/invalidate", post(invalidate_page))
        .route("/api/pages/:page/:kind", get(page_configs))
        .route("/api/:kind", get(list_configs).post(save_config))
        .route("/api/:kind/:id", get(get_config).delete(delete_config))
        .route("/api/:kind/:id/data", get(widget_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
