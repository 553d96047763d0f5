use tokio::sync::Mutex;

use super::data::Config;
use super::io::ConfigError;
use super::store::ConfigStore;

/// Single owner of the configuration record.
///
/// Every screen reads through [`current`](Self::current) and writes through
/// [`mutate`](Self::mutate), so read-modify-write cycles never interleave and
/// the cache is refreshed after each save.
pub struct ConfigOrchestrator<S> {
    store: S,
    cache: Mutex<Option<Config>>,
}

impl<S: ConfigStore> ConfigOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn current(&self) -> Result<Config, ConfigError> {
        let mut cache = self.cache.lock().await;
        if let Some(config) = cache.as_ref() {
            return Ok(config.clone());
        }
        let config = self.store.load().await?;
        *cache = Some(config.clone());
        Ok(config)
    }

    /// Drop the cached copy and read the store again.
    pub async fn reload(&self) -> Result<Config, ConfigError> {
        let mut cache = self.cache.lock().await;
        let config = self.store.load().await?;
        *cache = Some(config.clone());
        Ok(config)
    }

    pub async fn persist(&self, config: Config) -> Result<(), ConfigError> {
        let mut cache = self.cache.lock().await;
        self.store.save(&config).await?;
        *cache = Some(config);
        Ok(())
    }

    pub async fn mutate<F, T>(&self, mutator: F) -> Result<T, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<T, ConfigError>,
    {
        let mut cache = self.cache.lock().await;
        let mut working = match cache.as_ref() {
            Some(config) => config.clone(),
            None => self.store.load().await?,
        };

        let result = mutator(&mut working)?;
        self.store.save(&working).await?;
        *cache = Some(working);
        Ok(result)
    }
}
