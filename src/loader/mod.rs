//! Topological loader: turns a load request into installed modules and a
//! populated registry.

pub mod data;
pub mod hooks;
pub mod report;

pub use data::{DataLoader, LoadedIds};
pub use hooks::{HookContext, HookRegistry, ModuleHook};
pub use report::{LoadReport, ModuleOutcome, ModuleReport, Phase};

use crate::db::{self, modules};
use crate::error::{GraphError, IsFatal, RegentError};
use crate::graph;
use crate::registry::Registry;
use crate::schema::{self, SchemaChanges};
use crate::utils::logging::debug_json;
use ahash::{AHashMap, AHashSet};
use regent_manifest::{Catalog, ModuleDescriptor, ModuleState, adapt_version};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Modules to install, upgrade and remove in one pass.
///
/// An empty request only loads what is already installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub install: Vec<String>,
    pub upgrade: Vec<String>,
    pub remove: Vec<String>,
    /// Load demo files of newly installed modules.
    pub with_demo: bool,
}

impl LoadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn upgrade<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upgrade.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn remove<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn with_demo(mut self, with_demo: bool) -> Self {
        self.with_demo = with_demo;
        self
    }

    /// True when the request changes module states.
    pub fn is_update(&self) -> bool {
        !(self.install.is_empty() && self.upgrade.is_empty() && self.remove.is_empty())
    }

    fn check_known(&self, catalog: &Catalog) -> Result<(), GraphError> {
        let mut unknown: Vec<String> = self
            .install
            .iter()
            .chain(&self.upgrade)
            .chain(&self.remove)
            .filter(|name| !catalog.contains(name))
            .cloned()
            .collect();
        unknown.sort();
        unknown.dedup();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(GraphError::UnknownModules(unknown))
        }
    }
}

type Failure = (Phase, RegentError);

struct Installed {
    loaded_ids: LoadedIds,
    schema: SchemaChanges,
}

/// Runs load passes against one registry.
pub struct Loader<'a> {
    catalog: &'a Catalog,
    hooks: &'a HookRegistry,
    series: &'a str,
}

impl<'a> Loader<'a> {
    pub fn new(catalog: &'a Catalog, hooks: &'a HookRegistry, series: &'a str) -> Self {
        Self {
            catalog,
            hooks,
            series,
        }
    }

    /// Execute one load pass.
    ///
    /// Fatal errors abort the pass and leave the registry unusable; per-module
    /// failures are recorded in the report and the pass continues.
    pub async fn run(
        &self,
        registry: &mut Registry,
        request: &LoadRequest,
    ) -> Result<LoadReport, RegentError> {
        let mut report = LoadReport::default();
        let pool = registry.pool().clone();

        let mut conn = pool.acquire().await?;
        let fresh = !db::is_initialized(&mut conn).await?;
        if fresh {
            info!(db = registry.db_name(), "initializing a new database");
            db::initialize(&mut conn).await?;
        }
        drop(conn);
        registry.setup_signaling().await?;

        let update = fresh || request.is_update();
        request.check_known(self.catalog)?;

        if update {
            let mut tx = pool.begin().await?;
            let added = modules::sync_catalog(&mut tx, self.catalog).await?;
            if request.is_update() {
                self.mark(&mut tx, request).await?;
            }
            tx.commit().await?;
            debug!(db = registry.db_name(), added, "module states prepared");
        }

        let rows = {
            let mut conn = pool.acquire().await?;
            modules::all(&mut conn).await?
        };
        let order = self.load_order(&rows, update, &mut report)?;
        info!(db = registry.db_name(), modules = order.len(), "loading modules");

        let mut blocked: AHashMap<String, String> = AHashMap::default();
        let mut loaded = Vec::with_capacity(order.len());
        let mut updated = Vec::new();
        let mut processed: Vec<(String, LoadedIds)> = Vec::new();

        for name in &order {
            let (Some(module), Some(row)) = (self.catalog.get(name), rows.get(name)) else {
                continue;
            };

            let pending = update
                && matches!(row.state, ModuleState::ToInstall | ModuleState::ToUpgrade);

            if let Some(root) = module
                .depends
                .iter()
                .find_map(|dep| blocked.get(dep))
                .filter(|_| pending)
            {
                let root = root.clone();
                warn!(module = %name, blocked_by = %root, "module skipped: a dependency failed");
                report.record(name, ModuleOutcome::Skipped {
                    blocked_by: root.clone(),
                });
                blocked.insert(name.clone(), root);
                revert_state(&pool, name, row.state).await?;
                if row.state == ModuleState::ToUpgrade {
                    keep_installed(registry, module, &mut loaded, &mut report);
                }
                continue;
            }

            if !pending {
                if let Some(dep) = module.depends.iter().find(|dep| !loaded.contains(*dep)) {
                    let root = blocked.get(dep).cloned().unwrap_or_else(|| dep.clone());
                    warn!(module = %name, blocked_by = %root, "module skipped: a dependency is not loaded");
                    report.record(name, ModuleOutcome::Skipped {
                        blocked_by: root.clone(),
                    });
                    blocked.insert(name.clone(), root);
                    continue;
                }
            }

            if pending {
                let new_install = row.state == ModuleState::ToInstall;
                let demo = if new_install { request.with_demo } else { row.demo };
                match self.install_module(registry, module, new_install, demo).await {
                    Ok(done) => {
                        let outcome = if new_install {
                            ModuleOutcome::Installed
                        } else {
                            ModuleOutcome::Upgraded
                        };
                        info!(module = %name, ?outcome, "module loaded");
                        report.record(name, outcome);
                        report.schema.extend(done.schema);
                        processed.push((name.clone(), done.loaded_ids));
                        loaded.push(name.clone());
                        updated.push(name.clone());
                    }
                    Err((phase, err)) => {
                        if err.is_fatal() {
                            error!(module = %name, %phase, error = %err, "fatal error, aborting the load");
                            return Err(err);
                        }
                        error!(module = %name, %phase, error = %err, "module failed");
                        report.record(name, ModuleOutcome::Failed {
                            phase,
                            error: err.to_string(),
                        });
                        blocked.insert(name.clone(), name.clone());
                        revert_state(&pool, name, row.state).await?;
                        if !new_install {
                            keep_installed(registry, module, &mut loaded, &mut report);
                        }
                    }
                }
            } else {
                match registry.apply_module(module) {
                    Ok(_) => {
                        debug!(module = %name, "module models loaded");
                        report.record(name, ModuleOutcome::Loaded);
                        loaded.push(name.clone());
                    }
                    Err(err) => {
                        error!(module = %name, error = %err, "module failed");
                        report.record(name, ModuleOutcome::Failed {
                            phase: Phase::Models,
                            error: err.to_string(),
                        });
                        blocked.insert(name.clone(), name.clone());
                        if update {
                            revert_state(&pool, name, row.state).await?;
                        }
                    }
                }
            }
        }

        self.check_tables(&pool, registry, &loaded, update, &mut report)
            .await?;

        if update {
            for (module, ids) in &processed {
                let mut tx = pool.begin().await?;
                let removed = data::process_end(&mut tx, module, ids, registry.models()).await?;
                tx.commit().await?;
                if removed > 0 {
                    info!(module = %module, removed, "orphan records deleted");
                }
                report.orphans_removed += removed;
            }
        }

        let to_remove: Vec<String> = loaded
            .iter()
            .filter(|name| rows.get(*name).is_some_and(|r| r.state == ModuleState::ToRemove))
            .cloned()
            .collect();
        if update && !to_remove.is_empty() {
            loaded = self
                .remove_modules(&pool, registry, &to_remove, loaded, &mut report)
                .await?;
        }

        registry.set_modules(loaded, updated);
        if report.changed() {
            registry.signal_registry_change().await?;
            report.signaled = registry.multi_process();
        }

        debug_json("load report", &report);
        info!(
            db = registry.db_name(),
            models = registry.models().len(),
            failures = report.failures().count(),
            skipped = report.skipped().count(),
            warnings = report.warnings,
            "modules loaded"
        );
        Ok(report)
    }

    /// Move requested modules to their transitional states.
    async fn mark(
        &self,
        conn: &mut SqliteConnection,
        request: &LoadRequest,
    ) -> Result<(), RegentError> {
        let rows = modules::all(conn).await?;
        let active: AHashSet<String> = rows
            .values()
            .filter(|r| r.state.is_active())
            .map(|r| r.name.clone())
            .collect();

        let mut install = request.install.clone();
        if !request.upgrade.is_empty() {
            for name in graph::expand_dependents(self.catalog, &active, &request.upgrade) {
                let marked = modules::transition(
                    conn,
                    &name,
                    &[ModuleState::Installed],
                    ModuleState::ToUpgrade,
                )
                .await?;
                if !marked {
                    warn!(module = %name, "module is not installed; upgrade ignored");
                    continue;
                }
                if let Some(module) = self.catalog.get(&name) {
                    install.extend(module.depends.iter().filter(|d| !active.contains(*d)).cloned());
                }
            }
        }

        if !install.is_empty() {
            for name in graph::expand_install(self.catalog, &active, &install)? {
                modules::transition(
                    conn,
                    &name,
                    &[ModuleState::Uninstalled, ModuleState::ToInstall],
                    ModuleState::ToInstall,
                )
                .await?;
            }
        }

        if !request.remove.is_empty() {
            for name in graph::expand_dependents(self.catalog, &active, &request.remove) {
                modules::transition(
                    conn,
                    &name,
                    &[ModuleState::Installed, ModuleState::ToUpgrade],
                    ModuleState::ToRemove,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Topological order of every module taking part in the pass.
    ///
    /// Modules waiting for installation only take part in update passes.
    fn load_order(
        &self,
        rows: &AHashMap<String, db::DbModule>,
        update: bool,
        report: &mut LoadReport,
    ) -> Result<Vec<String>, RegentError> {
        let mut names: BTreeSet<String> = rows
            .values()
            .filter(|r| r.state.is_active() || (update && r.state == ModuleState::ToInstall))
            .map(|r| r.name.clone())
            .collect();

        names.retain(|name| {
            let on_disk = self.catalog.contains(name);
            if !on_disk {
                warn!(module = %name, "module is installed but not found in the addons paths; skipped");
                report.warn();
            }
            on_disk
        });

        loop {
            let unsatisfied: Vec<String> = names
                .iter()
                .filter(|name| {
                    self.catalog
                        .get(name)
                        .is_some_and(|m| m.depends.iter().any(|d| !names.contains(d)))
                })
                .cloned()
                .collect();
            if unsatisfied.is_empty() {
                break;
            }
            for name in unsatisfied {
                warn!(module = %name, "module has a dependency that is not installed; skipped");
                report.warn();
                names.remove(&name);
            }
        }

        Ok(graph::topological_order(self.catalog, &names)?)
    }

    /// Install or upgrade one module inside its own transaction.
    ///
    /// On failure the transaction is rolled back and the model mapping restored.
    async fn install_module(
        &self,
        registry: &mut Registry,
        module: &ModuleDescriptor,
        new_install: bool,
        demo: bool,
    ) -> Result<Installed, Failure> {
        let snapshot = registry.models().clone();
        let mut tx = registry
            .pool()
            .begin()
            .await
            .map_err(|e| (Phase::Finalize, RegentError::from(e)))?;

        match self
            .install_steps(&mut tx, registry, module, new_install, demo)
            .await
        {
            Ok(done) => {
                tx.commit().await.map_err(|e| {
                    registry.replace_models(snapshot);
                    (Phase::Finalize, RegentError::from(e))
                })?;
                Ok(done)
            }
            Err(failure) => {
                if let Err(e) = tx.rollback().await {
                    warn!(module = %module.name, error = %e, "rollback failed");
                }
                registry.replace_models(snapshot);
                Err(failure)
            }
        }
    }

    async fn install_steps(
        &self,
        conn: &mut SqliteConnection,
        registry: &mut Registry,
        module: &ModuleDescriptor,
        new_install: bool,
        demo: bool,
    ) -> Result<Installed, Failure> {
        let name = module.name.as_str();

        if let Some(hook) = module.pre_init_hook.as_deref().filter(|_| new_install) {
            self.run_hook(conn, registry, name, hook)
                .await
                .map_err(|e| (Phase::PreInit, e))?;
        }

        let touched = registry
            .apply_module(module)
            .map_err(|e| (Phase::Models, e))?;

        let mut changes = SchemaChanges::default();
        for model_name in &touched {
            if let Some(model) = registry.model(model_name) {
                let done = schema::reconcile(conn, model, registry.models())
                    .await
                    .map_err(|e| (Phase::Schema, RegentError::from(e)))?;
                changes.extend(done);
            }
        }

        let mut records = DataLoader::new(name, module.root(), registry.models());
        let written = records
            .load_files(conn, &module.data)
            .await
            .map_err(|e| (Phase::Data, RegentError::from(e)))?;
        if demo {
            records
                .load_files(conn, &module.demo)
                .await
                .map_err(|e| (Phase::Demo, RegentError::from(e)))?;
        }
        let loaded_ids = records.into_loaded();
        debug!(module = name, records = written, demo, "module data loaded");

        if let Some(hook) = module.post_init_hook.as_deref().filter(|_| new_install) {
            self.run_hook(conn, registry, name, hook)
                .await
                .map_err(|e| (Phase::PostInit, e))?;
        }

        let version = adapt_version(self.series, &module.version);
        modules::mark_installed(conn, name, &version, demo)
            .await
            .map_err(|e| (Phase::Finalize, RegentError::from(e)))?;

        Ok(Installed {
            loaded_ids,
            schema: changes,
        })
    }

    async fn run_hook(
        &self,
        conn: &mut SqliteConnection,
        registry: &Registry,
        module: &str,
        hook: &str,
    ) -> Result<(), RegentError> {
        let Some(implementation) = self.hooks.get(hook) else {
            return Err(RegentError::MissingHook {
                module: module.to_string(),
                hook: hook.to_string(),
            });
        };
        debug!(module, hook, "running hook");
        implementation
            .run(HookContext {
                module,
                conn,
                models: registry.models(),
            })
            .await
            .map_err(|source| RegentError::Hook {
                module: module.to_string(),
                hook: hook.to_string(),
                source,
            })
    }

    /// Recreate tables that went missing and report leftover columns.
    ///
    /// Plain loads only report; tables are recreated on update passes.
    async fn check_tables(
        &self,
        pool: &SqlitePool,
        registry: &Registry,
        loaded: &[String],
        update: bool,
        report: &mut LoadReport,
    ) -> Result<(), RegentError> {
        let mut conn = pool.acquire().await?;
        let mut missing = schema::missing_tables(&mut conn, registry.models().values()).await?;

        if !update {
            schema::report_missing(&missing);
            report.warnings += missing.len();
        } else if !missing.is_empty() {
            let rank = |model: &str| {
                registry
                    .model(model)
                    .and_then(|m| m.modules.first())
                    .and_then(|first| loaded.iter().position(|l| l == first))
                    .unwrap_or(usize::MAX)
            };
            missing.sort_by_key(|model| (rank(model), model.clone()));
            info!(models = ?missing, "recreating missing tables");

            for name in &missing {
                let Some(model) = registry.model(name) else {
                    continue;
                };
                match schema::reconcile(&mut conn, model, registry.models()).await {
                    Ok(changes) => report.schema.extend(changes),
                    Err(err) => warn!(model = %name, error = %err, "failed to recreate table"),
                }
            }

            let still_missing = schema::missing_tables(&mut conn, registry.models().values()).await?;
            schema::report_missing(&still_missing);
            report.warnings += still_missing.len();
        }

        for model in registry.models().values() {
            let removed = schema::removed_columns(&mut conn, model).await?;
            schema::report_removed(model, &removed);
            report.warnings += removed.len();
        }
        Ok(())
    }

    /// Uninstall `to_remove` in reverse dependency order and recompose the
    /// registry from what stays installed. Returns the remaining load order.
    async fn remove_modules(
        &self,
        pool: &SqlitePool,
        registry: &mut Registry,
        to_remove: &[String],
        loaded: Vec<String>,
        report: &mut LoadReport,
    ) -> Result<Vec<String>, RegentError> {
        for name in to_remove.iter().rev() {
            let mut tx = pool.begin().await?;
            let uninstall_failed = |source: RegentError| RegentError::UninstallFailed {
                module: name.clone(),
                source: Box::new(source),
            };

            if let Some(hook) = self
                .catalog
                .get(name)
                .and_then(|m| m.uninstall_hook.as_deref())
            {
                self.run_hook(&mut tx, registry, name, hook)
                    .await
                    .map_err(uninstall_failed)?;
            }
            let records = data::remove_module_records(&mut tx, name, registry.models())
                .await
                .map_err(|e| uninstall_failed(e.into()))?;
            modules::mark_uninstalled(&mut tx, name).await?;
            tx.commit().await?;

            info!(module = %name, records, "module uninstalled");
            report.record(name, ModuleOutcome::Removed);
        }

        let remaining: Vec<String> = loaded
            .into_iter()
            .filter(|name| !to_remove.contains(name))
            .collect();

        registry.replace_models(Default::default());
        let mut recomposed = Vec::with_capacity(remaining.len());
        for name in remaining {
            let Some(module) = self.catalog.get(&name) else {
                continue;
            };
            match registry.apply_module(module) {
                Ok(_) => recomposed.push(name),
                Err(err) => {
                    error!(module = %name, error = %err, "module failed after removals");
                    report.record(&name, ModuleOutcome::Failed {
                        phase: Phase::Models,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(recomposed)
    }
}

/// Keep the models of an installed module whose upgrade did not go through.
fn keep_installed(
    registry: &mut Registry,
    module: &ModuleDescriptor,
    loaded: &mut Vec<String>,
    report: &mut LoadReport,
) {
    match registry.apply_module(module) {
        Ok(_) => {
            debug!(module = %module.name, "previously installed models kept");
            loaded.push(module.name.clone());
        }
        Err(err) => {
            error!(module = %module.name, error = %err, "installed module models could not be loaded");
            report.warn();
        }
    }
}

/// Return a module that could not be processed to its last stable state.
async fn revert_state(
    pool: &SqlitePool,
    name: &str,
    state: ModuleState,
) -> Result<(), sqlx::Error> {
    let stable = match state {
        ModuleState::ToInstall => ModuleState::Uninstalled,
        ModuleState::ToUpgrade | ModuleState::ToRemove => ModuleState::Installed,
        _ => return Ok(()),
    };
    let mut conn = pool.acquire().await?;
    modules::set_state(&mut conn, name, stable).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_not_an_update() {
        assert!(!LoadRequest::new().with_demo(true).is_update());
        assert!(LoadRequest::new().remove(["crm"]).is_update());
    }

    #[test]
    fn unknown_requested_modules_are_reported_once() {
        let catalog: Catalog = [ModuleDescriptor::new("base")].into_iter().collect();
        let request = LoadRequest::new()
            .install(["base", "ghost"])
            .upgrade(["ghost"]);
        assert_eq!(
            request.check_known(&catalog),
            Err(GraphError::UnknownModules(vec!["ghost".to_string()]))
        );
    }
}
