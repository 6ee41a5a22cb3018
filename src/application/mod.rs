// Application layer - Use cases and the ports they depend on
pub mod cache_store;
pub mod config_cache;
pub mod config_repository;
pub mod config_service;
pub mod data_source;
pub mod transform;
pub mod widget_service;

#[cfg(test)]
pub mod testing;
