use crate::schema::SchemaChanges;
use serde::Serialize;
use std::fmt;

/// Step of a module install during which an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreInit,
    Models,
    Schema,
    Data,
    Demo,
    PostInit,
    Finalize,
    Uninstall,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PreInit => "pre_init",
            Phase::Models => "models",
            Phase::Schema => "schema",
            Phase::Data => "data",
            Phase::Demo => "demo",
            Phase::PostInit => "post_init",
            Phase::Finalize => "finalize",
            Phase::Uninstall => "uninstall",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModuleOutcome {
    Installed,
    Upgraded,
    /// Already installed; only its models were loaded.
    Loaded,
    Removed,
    Failed { phase: Phase, error: String },
    /// Not attempted because a dependency failed.
    Skipped { blocked_by: String },
}

impl ModuleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ModuleOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ModuleOutcome::Skipped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    pub module: String,
    #[serde(flatten)]
    pub outcome: ModuleOutcome,
}

/// What a load pass did, module by module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub modules: Vec<ModuleReport>,
    pub schema: SchemaChanges,
    pub warnings: usize,
    /// Orphaned external ids removed after the pass.
    pub orphans_removed: usize,
    /// Whether the registry sequence was advanced.
    pub signaled: bool,
}

impl LoadReport {
    /// Record `outcome` for `module`, replacing an earlier entry.
    pub fn record(&mut self, module: &str, outcome: ModuleOutcome) {
        match self.modules.iter_mut().find(|r| r.module == module) {
            Some(entry) => entry.outcome = outcome,
            None => self.modules.push(ModuleReport {
                module: module.to_string(),
                outcome,
            }),
        }
    }

    pub fn warn(&mut self) {
        self.warnings += 1;
    }

    pub fn outcome(&self, module: &str) -> Option<&ModuleOutcome> {
        self.modules
            .iter()
            .find(|r| r.module == module)
            .map(|r| &r.outcome)
    }

    /// Modules that failed themselves. Their dependents show up in [`Self::skipped`].
    pub fn failures(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules.iter().filter(|r| r.outcome.is_failure())
    }

    /// Modules left alone because a dependency failed.
    pub fn skipped(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules.iter().filter(|r| r.outcome.is_skipped())
    }

    /// Modules with the given outcome kind, in processing order.
    pub fn modules_where<F>(&self, predicate: F) -> Vec<&str>
    where
        F: Fn(&ModuleOutcome) -> bool,
    {
        self.modules
            .iter()
            .filter(|r| predicate(&r.outcome))
            .map(|r| r.module.as_str())
            .collect()
    }

    pub fn installed(&self) -> Vec<&str> {
        self.modules_where(|o| matches!(o, ModuleOutcome::Installed))
    }

    pub fn removed(&self) -> Vec<&str> {
        self.modules_where(|o| matches!(o, ModuleOutcome::Removed))
    }

    /// True when the pass installed, upgraded or removed something or touched the schema.
    pub fn changed(&self) -> bool {
        !self.schema.is_empty()
            || self.modules.iter().any(|r| {
                matches!(
                    r.outcome,
                    ModuleOutcome::Installed | ModuleOutcome::Upgraded | ModuleOutcome::Removed
                )
            })
    }

    /// No module failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && self.skipped().next().is_none()
    }

    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_modules_are_not_failures_but_fail_the_pass() {
        let mut report = LoadReport::default();
        report.record("base", ModuleOutcome::Installed);
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);

        report.record(
            "sale",
            ModuleOutcome::Skipped {
                blocked_by: "product".to_string(),
            },
        );
        assert!(!report.is_success());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(report.skipped().count(), 1);

        report.record(
            "product",
            ModuleOutcome::Failed {
                phase: Phase::Schema,
                error: "boom".to_string(),
            },
        );
        let failed: Vec<&str> = report.failures().map(|r| r.module.as_str()).collect();
        assert_eq!(failed, ["product"]);
    }

    #[test]
    fn later_outcome_replaces_earlier_one() {
        let mut report = LoadReport::default();
        report.record("crm", ModuleOutcome::Loaded);
        report.record("crm", ModuleOutcome::Removed);
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.removed(), ["crm"]);
        assert!(report.changed());
    }

    #[test]
    fn serializes_outcome_inline() {
        let mut report = LoadReport::default();
        report.record(
            "stock",
            ModuleOutcome::Failed {
                phase: Phase::Data,
                error: "boom".to_string(),
            },
        );
        let json = serde_json::to_value(&report.modules[0]).unwrap();
        assert_eq!(json["module"], "stock");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["phase"], "data");
    }
}
