//! Initialization helpers for the application startup.

use crate::config::{Config, StoreBackend};
use crate::engine::ConfigStore;
use crate::store::{JsonFileStore, MemoryStore};
use std::sync::Arc;
use tracing::info;

/// Sets up the tracing subscriber with the configured filters.
///
/// Logs go to stderr; stdout carries protocol responses.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Picks the persistence backend named in the settings.
pub fn init_store(config: &Config) -> Arc<dyn ConfigStore> {
    match config.store.backend {
        StoreBackend::File => {
            info!("Using JSON state file at {}", config.store.path);
            Arc::new(JsonFileStore::new(&config.store.path))
        }
        StoreBackend::Memory => {
            info!("Using in-memory state. Changes are lost on exit.");
            Arc::new(MemoryStore::new())
        }
    }
}
