//! Configuration persistence backends.

use crate::engine::{ConfigStore, Configuration};
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Volatile store, used when persistence is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: RwLock<Option<Configuration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(config: Configuration) -> Self {
        Self {
            slot: RwLock::new(Some(config)),
        }
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<Option<Configuration>> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, config: &Configuration) -> Result<()> {
        *self.slot.write().await = Some(config.clone());
        Ok(())
    }
}

/// JSON file holding the four Configuration fields.
///
/// Saves go to a sibling temp file that is renamed over the target, so a
/// reader sees either the old or the new document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Configuration>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read state file {}", self.path.display())
                })
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&contents).context("Failed to parse state file JSON")?;
        Ok(Some(Configuration::from_value(&value)))
    }

    async fn save(&self, config: &Configuration) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create state directory")?;
        }

        let body = serde_json::to_vec_pretty(config).context("Failed to encode configuration")?;
        let temp = self.temp_path();
        fs::write(&temp, body)
            .await
            .context("Failed to write temporary state file")?;
        fs::rename(&temp, &self.path)
            .await
            .context("Failed to replace state file")?;

        debug!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        let config = Configuration::new(false, ["example.com"], 9, true);
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let config = Configuration::new(true, ["example.com", "spoilers.net"], 12, false);
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(config));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_store_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{ "blockedWebsites": ["www.example.com"], "blurAmount": 50 }"#)
            .unwrap();

        let loaded = JsonFileStore::new(&path).load().await.unwrap().unwrap();
        assert!(loaded.enabled());
        assert!(loaded.blocked_domains().contains("example.com"));
        assert_eq!(loaded.blur_amount().get(), 20);
        assert!(!loaded.blur_videos());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(JsonFileStore::new(&path).load().await.is_err());
    }
}
