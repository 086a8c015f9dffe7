//! Process-wide LRU of registries keyed by database name.

use crate::config::Config;
use crate::db;
use crate::error::RegentError;
use crate::loader::{HookRegistry, LoadReport, LoadRequest, Loader};
use crate::registry::{BuildLock, Registry, SignalState};
use lru::LruCache;
use parking_lot::Mutex;
use regent_manifest::scan_addons;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Bounded set of ready registries.
///
/// Builds are serialized by the injected [`BuildLock`]; the LRU bookkeeping has
/// its own short-lived mutex so lookups never wait for a build.
pub struct RegistryCache {
    config: Config,
    hooks: Arc<HookRegistry>,
    lock: Arc<dyn BuildLock>,
    entries: Mutex<LruCache<String, Arc<Registry>>>,
}

impl RegistryCache {
    pub fn new(config: Config, lock: Arc<dyn BuildLock>) -> Self {
        let capacity = NonZeroUsize::new(config.registry.lru_capacity()).unwrap_or(NonZeroUsize::MIN);
        info!(capacity = capacity.get(), "registry cache created");
        Self {
            config,
            hooks: Arc::new(HookRegistry::default()),
            lock,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Use `hooks` for every registry built from now on.
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, db_name: &str) -> bool {
        self.entries.lock().contains(db_name)
    }

    /// Cached registry of `db_name`, marking it most recently used.
    pub fn get(&self, db_name: &str) -> Option<Arc<Registry>> {
        self.entries.lock().get(db_name).cloned()
    }

    /// Database names from most to least recently used.
    pub fn db_names(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Return the registry of `db_name`, loading installed modules on a miss.
    pub async fn get_or_build(&self, db_name: &str) -> Result<Arc<Registry>, RegentError> {
        if let Some(registry) = self.get(db_name) {
            return Ok(registry);
        }
        let _guard = self.lock.acquire().await;
        if let Some(registry) = self.get(db_name) {
            return Ok(registry);
        }
        let (registry, _) = self.build(db_name, &LoadRequest::default()).await?;
        Ok(registry)
    }

    /// Build a fresh registry for `db_name` running `request`, replacing any
    /// cached one.
    pub async fn new_registry(
        &self,
        db_name: &str,
        request: &LoadRequest,
    ) -> Result<(Arc<Registry>, LoadReport), RegentError> {
        let _guard = self.lock.acquire().await;
        self.evict(db_name).await;
        self.build(db_name, request).await
    }

    /// Bring the cached registry of `db_name` up to date with other processes.
    ///
    /// A registry change rebuilds it, a cache change clears its derived values.
    /// Concurrent callers that saw the same stale registry share one rebuild.
    pub async fn check_signaling(&self, db_name: &str) -> Result<Arc<Registry>, RegentError> {
        let registry = self.get_or_build(db_name).await?;
        let state = registry
            .poll_signaling()
            .await
            .map_err(|e| RegentError::build_failed(db_name, e.into()))?;
        match state {
            SignalState::RegistryChanged => {
                let _guard = self.lock.acquire().await;
                if let Some(current) = self
                    .get(db_name)
                    .filter(|current| !Arc::ptr_eq(current, &registry))
                {
                    debug!(db = db_name, "registry already rebuilt by another caller");
                    return Ok(current);
                }
                info!(db = db_name, "reloading the registry after database signaling");
                self.evict(db_name).await;
                let (rebuilt, _) = self.build(db_name, &LoadRequest::default()).await?;
                Ok(rebuilt)
            }
            SignalState::CachesChanged | SignalState::Unchanged => Ok(registry),
        }
    }

    /// Drop `db_name` from the cache and release its resources.
    pub async fn evict(&self, db_name: &str) -> bool {
        let removed = self.entries.lock().pop(db_name);
        match removed {
            Some(registry) => {
                registry.release().await;
                info!(db = db_name, "registry evicted");
                true
            }
            None => false,
        }
    }

    /// Drop every cached registry.
    pub async fn clear_all(&self) {
        let drained: Vec<(String, Arc<Registry>)> = {
            let mut entries = self.entries.lock();
            let mut drained = Vec::with_capacity(entries.len());
            while let Some(entry) = entries.pop_lru() {
                drained.push(entry);
            }
            drained
        };
        for (db_name, registry) in drained {
            registry.release().await;
            debug!(db = %db_name, "registry released");
        }
    }

    async fn build(
        &self,
        db_name: &str,
        request: &LoadRequest,
    ) -> Result<(Arc<Registry>, LoadReport), RegentError> {
        let url = self.config.basic.database_url(db_name)?;
        std::fs::create_dir_all(&self.config.basic.data_dir)
            .map_err(|e| RegentError::build_failed(db_name, e.into()))?;

        let pool = db::connect(&url, self.config.registry.pool_size)
            .await
            .map_err(|e| RegentError::build_failed(db_name, e.into()))?;
        let mut registry = Registry::new(
            db_name,
            pool,
            self.config.registry.cache_capacity,
            self.config.registry.multi_process,
        );

        match self.load(&mut registry, request).await {
            Ok(report) => {
                let registry = Arc::new(registry);
                self.insert(db_name, Arc::clone(&registry)).await;
                Ok((registry, report))
            }
            Err(err) => {
                error!(db = db_name, error = %err, "failed to build registry");
                registry.release().await;
                Err(RegentError::build_failed(db_name, err))
            }
        }
    }

    async fn load(
        &self,
        registry: &mut Registry,
        request: &LoadRequest,
    ) -> Result<LoadReport, RegentError> {
        let catalog = scan_addons(&self.config.basic.addons_path)?;
        Loader::new(&catalog, &self.hooks, &self.config.basic.server_series)
            .run(registry, request)
            .await
    }

    /// Insert and release whatever the insertion pushed out.
    async fn insert(&self, db_name: &str, registry: Arc<Registry>) {
        let pushed_out = self.entries.lock().push(db_name.to_string(), registry);
        if let Some((evicted, old)) = pushed_out {
            old.release().await;
            info!(db = %evicted, "least recently used registry evicted");
        }
    }
}
