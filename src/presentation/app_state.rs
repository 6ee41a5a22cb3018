// Application state for HTTP handlers
use crate::application::config_service::ConfigService;
use crate::application::widget_service::WidgetService;

#[derive(Clone)]
pub struct AppState {
    pub config_service: ConfigService,
    pub widget_service: WidgetService,
}
