//! Per-database registries and the process-wide cache holding them.

pub mod cache;
pub mod lock;
pub mod model;
pub mod signaling;

pub use cache::RegistryCache;
pub use lock::{BuildGuard, BuildLock, NoopLock, ProcessLock};
pub use model::{Model, ModelMap};
pub use signaling::{Sequences, Signal, SignalState};

use crate::error::RegentError;
use moka::sync::Cache;
use regent_manifest::ModuleDescriptor;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};
use tracing::{debug, info};

pub type DerivedCache = Cache<String, Arc<Value>>;

/// Everything known about one database: composed models, loaded modules and
/// the derived-value cache.
///
/// A load pass owns the registry mutably; once published it is shared as
/// `Arc<Registry>` and only the cache and the sequence numbers change.
pub struct Registry {
    db_name: String,
    pool: SqlitePool,
    models: ModelMap,
    loaded_modules: Vec<String>,
    updated_modules: Vec<String>,
    cache: DerivedCache,
    registry_sequence: AtomicI64,
    cache_sequence: AtomicI64,
    cache_cleared: AtomicBool,
    multi_process: bool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("db_name", &self.db_name)
            .field("models", &self.models.len())
            .field("loaded_modules", &self.loaded_modules)
            .field("sequences", &self.sequences())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(db_name: &str, pool: SqlitePool, cache_capacity: u64, multi_process: bool) -> Self {
        Self {
            db_name: db_name.to_string(),
            pool,
            models: ModelMap::new(),
            loaded_modules: Vec::new(),
            updated_modules: Vec::new(),
            cache: DerivedCache::builder()
                .max_capacity(cache_capacity.max(1))
                .build(),
            registry_sequence: AtomicI64::new(1),
            cache_sequence: AtomicI64::new(1),
            cache_cleared: AtomicBool::new(false),
            multi_process,
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn models(&self) -> &ModelMap {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn contains_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Modules whose models are part of the registry, in load order.
    pub fn loaded_modules(&self) -> &[String] {
        &self.loaded_modules
    }

    /// Modules installed or upgraded by the pass that built this registry.
    pub fn updated_modules(&self) -> &[String] {
        &self.updated_modules
    }

    pub fn multi_process(&self) -> bool {
        self.multi_process
    }

    /// Fold every model contribution of `module` into the registry.
    ///
    /// Returns the names of the touched models in contribution order. Nothing is
    /// applied when one contribution extends an unknown model.
    pub(crate) fn apply_module(
        &mut self,
        module: &ModuleDescriptor,
    ) -> Result<Vec<String>, RegentError> {
        if let Some(spec) = module
            .models
            .iter()
            .find(|spec| spec.extend && !self.models.contains_key(&spec.name))
        {
            return Err(RegentError::UnknownBaseModel {
                module: module.name.clone(),
                model: spec.name.clone(),
            });
        }

        let mut touched = Vec::with_capacity(module.models.len());
        for spec in &module.models {
            match self.models.get_mut(&spec.name) {
                Some(model) => model.merge(&module.name, spec),
                None => {
                    self.models
                        .insert(spec.name.clone(), Model::from_spec(&module.name, spec));
                }
            }
            if !touched.contains(&spec.name) {
                touched.push(spec.name.clone());
            }
        }
        Ok(touched)
    }

    pub(crate) fn replace_models(&mut self, models: ModelMap) {
        self.models = models;
    }

    pub(crate) fn set_modules(&mut self, loaded: Vec<String>, updated: Vec<String>) {
        self.loaded_modules = loaded;
        self.updated_modules = updated;
    }

    /// Cached derived value for `key`, computing it on a miss.
    pub fn cached<F>(&self, key: &str, init: F) -> Arc<Value>
    where
        F: FnOnce() -> Value,
    {
        self.cache.get_with(key.to_string(), || Arc::new(init()))
    }

    pub fn cache_get(&self, key: &str) -> Option<Arc<Value>> {
        self.cache.get(key)
    }

    pub fn cache_insert(&self, key: &str, value: Value) {
        self.cache.insert(key.to_string(), Arc::new(value));
    }

    /// Drop every derived value and remember to tell the other processes.
    pub fn clear_caches(&self) {
        self.cache.invalidate_all();
        self.cache_cleared.store(true, Ordering::SeqCst);
    }

    pub fn cache_cleared(&self) -> bool {
        self.cache_cleared.load(Ordering::SeqCst)
    }

    pub fn sequences(&self) -> Sequences {
        Sequences {
            registry: self.registry_sequence.load(Ordering::SeqCst),
            cache: self.cache_sequence.load(Ordering::SeqCst),
        }
    }

    fn store_sequences(&self, sequences: Sequences) {
        self.registry_sequence
            .store(sequences.registry, Ordering::SeqCst);
        self.cache_sequence.store(sequences.cache, Ordering::SeqCst);
    }

    /// Create the counters if needed and adopt their current values.
    pub async fn setup_signaling(&self) -> Result<(), sqlx::Error> {
        if !self.multi_process {
            return Ok(());
        }
        let sequences = signaling::setup(&self.pool).await?;
        self.store_sequences(sequences);
        debug!(db = %self.db_name, ?sequences, "signaling set up");
        Ok(())
    }

    /// Compare local sequences with the database and act on cache-only changes.
    ///
    /// Derived caches are cleared in place when only the cache counter moved.
    /// A registry change is reported to the caller, which owns the rebuild; this
    /// registry keeps its old sequences, so every holder keeps seeing it stale.
    /// A released registry always reports a registry change.
    pub async fn poll_signaling(&self) -> Result<SignalState, sqlx::Error> {
        if self.is_released() {
            return Ok(SignalState::RegistryChanged);
        }
        if !self.multi_process {
            return Ok(SignalState::Unchanged);
        }
        let current = match signaling::current(&self.pool).await {
            Ok(current) => current,
            Err(sqlx::Error::PoolClosed) => return Ok(SignalState::RegistryChanged),
            Err(err) => return Err(err),
        };
        let state = self.sequences().compare(current);
        match state {
            SignalState::RegistryChanged => {
                info!(db = %self.db_name, "registry changed in another process");
                return Ok(state);
            }
            SignalState::CachesChanged => {
                info!(db = %self.db_name, "invalidating all caches after database signaling");
                self.cache.invalidate_all();
                self.cache_cleared.store(false, Ordering::SeqCst);
            }
            SignalState::Unchanged => {}
        }
        self.store_sequences(current);
        Ok(state)
    }

    /// Tell other processes the model mapping changed.
    pub async fn signal_registry_change(&self) -> Result<(), sqlx::Error> {
        if !self.multi_process {
            return Ok(());
        }
        let value = signaling::advance(&self.pool, Signal::Registry).await?;
        self.registry_sequence.store(value, Ordering::SeqCst);
        info!(db = %self.db_name, sequence = value, "registry changed, signaling through the database");
        Ok(())
    }

    /// Tell other processes to drop their caches, if ours were cleared since the
    /// last signal. Several local clears collapse into one increment.
    pub async fn signal_caches_change(&self) -> Result<(), sqlx::Error> {
        if !self.cache_cleared.swap(false, Ordering::SeqCst) || !self.multi_process {
            return Ok(());
        }
        let value = signaling::advance(&self.pool, Signal::Cache).await?;
        self.cache_sequence.store(value, Ordering::SeqCst);
        info!(db = %self.db_name, sequence = value, "caches invalidated, signaling through the database");
        Ok(())
    }

    /// Give back the derived cache and the database connections.
    pub async fn release(&self) {
        self.cache.invalidate_all();
        self.pool.close().await;
        debug!(db = %self.db_name, "registry released");
    }

    pub fn is_released(&self) -> bool {
        self.pool.is_closed()
    }
}
