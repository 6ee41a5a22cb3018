// Infrastructure layer - External dependencies and adapters
pub mod api_fetcher;
pub mod config;
pub mod envelope;
pub mod http_config_repository;
pub mod local_store;
