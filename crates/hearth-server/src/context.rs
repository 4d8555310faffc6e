use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hearth_cache::{Cache, SlotSpec};
use hearth_store::{sweep_temp_files, write_atomically, Collection, StoreResult};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::hooks::Heartbeat;

/// Cache slot holding the parsed settings document.
pub const SETTINGS_SLOT: &str = "settings";

/// Everything a handler may touch. Owned by the serving loop and lent to
/// one handler at a time.
#[derive(Debug)]
pub struct AppContext {
    pub cache: Cache,
    collections: BTreeMap<String, Collection>,
    settings_path: PathBuf,
    heartbeat: Arc<Heartbeat>,
}

impl AppContext {
    /// Prepare the data directory and open every configured collection.
    pub fn open(config: &ServerConfig) -> ServerResult<Self> {
        Self::open_with_cache(config, Cache::new())
    }

    pub fn open_with_cache(config: &ServerConfig, mut cache: Cache) -> ServerResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let removed = sweep_temp_files(&config.data_dir)?;
        if removed > 0 {
            info!(removed, dir = %config.data_dir.display(), "removed leftover temp files");
        }

        let mut collections = BTreeMap::new();
        for name in &config.collections {
            let collection = Collection::open(config.collection_path(name), &mut cache)?;
            collections.insert(name.clone(), collection);
        }

        cache.register(
            SETTINGS_SLOT,
            SlotSpec::scalar().with_ttl(Duration::from_secs(config.settings_ttl_secs)),
        );

        info!(collections = collections.len(), "application context ready");
        Ok(Self {
            cache,
            collections,
            settings_path: config.settings_path(),
            heartbeat: Arc::new(Heartbeat::new()),
        })
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// A collection together with the cache its operations need.
    pub fn collection_and_cache(&mut self, name: &str) -> Option<(&Collection, &mut Cache)> {
        let collection = self.collections.get(name)?;
        Some((collection, &mut self.cache))
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Record count of every collection, served from the count slots when
    /// they are warm.
    pub fn record_counts(&mut self) -> StoreResult<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for (name, collection) in &self.collections {
            counts.insert(name.clone(), collection.count(&mut self.cache)?);
        }
        Ok(counts)
    }

    pub fn heartbeat(&self) -> &Arc<Heartbeat> {
        &self.heartbeat
    }

    /// The settings document, from cache or `settings.json`. A missing or
    /// unreadable file reads as an empty object.
    pub fn settings(&mut self) -> ServerResult<Map<String, Value>> {
        if let Some(Value::Object(map)) = self.cache.get_val(SETTINGS_SLOT) {
            return Ok(map);
        }

        let settings = match fs::read(&self.settings_path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(path = %self.settings_path.display(), "settings file is not a JSON object, ignoring");
                    Map::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        self.cache.set_val(SETTINGS_SLOT, Value::Object(settings.clone()));
        Ok(settings)
    }

    /// Merge `changes` into the settings and persist them atomically.
    pub fn update_settings(&mut self, changes: Map<String, Value>) -> ServerResult<Map<String, Value>> {
        let mut settings = self.settings()?;
        settings.extend(changes);
        let bytes = serde_json::to_vec(&settings).map_err(hearth_store::StoreError::from)?;
        write_atomically(&self.settings_path, &bytes)?;
        self.cache.invalidate(SETTINGS_SLOT, None);
        Ok(settings)
    }
}
