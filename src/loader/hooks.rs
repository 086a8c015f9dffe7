//! Named module hooks.
//!
//! Manifests refer to hooks by name; the embedding application registers the
//! implementations before building registries.

use crate::error::HookError;
use crate::registry::ModelMap;
use ahash::AHashMap;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::sync::Arc;

/// What a hook may see and touch: the module's transaction and the models
/// composed so far.
pub struct HookContext<'a> {
    pub module: &'a str,
    pub conn: &'a mut SqliteConnection,
    pub models: &'a ModelMap,
}

#[async_trait]
pub trait ModuleHook: Send + Sync {
    async fn run(&self, ctx: HookContext<'_>) -> Result<(), HookError>;
}

#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: AHashMap<String, Arc<dyn ModuleHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, hook: Arc<dyn ModuleHook>) -> &mut Self {
        self.hooks.insert(name.into(), hook);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModuleHook>> {
        self.hooks.get(name).cloned()
    }

}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("HookRegistry").field("hooks", &names).finish()
    }
}
