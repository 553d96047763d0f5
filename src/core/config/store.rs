//! Durable persistence for the single configuration record.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::data::{path_display, Config};
use super::io::ConfigError;

/// Storage key the configuration blob lives under.
pub const CONFIG_KEY: &str = "chat_config";

/// Loads and saves the configuration record as one opaque blob.
///
/// `load` returns the seeded default when nothing has been stored yet.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<Config, ConfigError>;
    async fn save(&self, config: &Config) -> Result<(), ConfigError>;
}

/// JSON file on disk, written atomically.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform configuration directory.
    pub fn at_default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(Config::default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Config, ConfigError> {
        let path = self.path.clone();
        let config = tokio::task::spawn_blocking(move || Config::load_from_path(&path))
            .await
            .map_err(|err| ConfigError::Read {
                path: self.path.clone(),
                source: std::io::Error::other(err),
            })??;
        debug!(path = %path_display(&self.path), channels = config.channels.len(), "loaded config");
        Ok(config)
    }

    async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let path = self.path.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || config.save_to_path(&path))
            .await
            .map_err(|err| ConfigError::Write {
                path: self.path.clone(),
                source: std::io::Error::other(err),
            })??;
        debug!(path = %path_display(&self.path), "saved config");
        Ok(())
    }
}

/// Keeps the encoded blob in memory under [`CONFIG_KEY`].
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blob: Mutex<Option<String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            blob: Mutex::new(Some(config.to_json()?)),
        })
    }

    /// The raw persisted state, if anything has been saved.
    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.blob
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<Config, ConfigError> {
        match self.lock().as_deref() {
            Some(blob) => Config::from_json(blob),
            None => Ok(Config::default()),
        }
    }

    async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let blob = config.to_json()?;
        *self.lock() = Some(blob);
        Ok(())
    }
}

#[async_trait]
impl<T: ConfigStore + ?Sized> ConfigStore for std::sync::Arc<T> {
    async fn load(&self) -> Result<Config, ConfigError> {
        (**self).load().await
    }

    async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        (**self).save(config).await
    }
}
