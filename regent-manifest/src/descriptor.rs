use crate::model::ModelSpec;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Installation state of a module, as stored in the module table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Uninstalled,
    ToInstall,
    Installed,
    ToUpgrade,
    ToRemove,
    Uninstallable,
}

impl ModuleState {
    pub const ALL: [ModuleState; 6] = [
        ModuleState::Uninstalled,
        ModuleState::ToInstall,
        ModuleState::Installed,
        ModuleState::ToUpgrade,
        ModuleState::ToRemove,
        ModuleState::Uninstallable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::ToInstall => "to_install",
            ModuleState::Installed => "installed",
            ModuleState::ToUpgrade => "to_upgrade",
            ModuleState::ToRemove => "to_remove",
            ModuleState::Uninstallable => "uninstallable",
        }
    }

    /// States of modules that are part of the running system.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ModuleState::Installed | ModuleState::ToUpgrade | ModuleState::ToRemove
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl fmt::Display for UnknownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown module state '{}'", self.0)
    }
}

impl std::error::Error for UnknownState {}

impl FromStr for ModuleState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

impl TryFrom<String> for ModuleState {
    type Error = UnknownState;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parsed module descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    /// Declared dependencies in manifest order, without duplicates.
    pub depends: Vec<String>,
    pub auto_install: bool,
    pub installable: bool,
    pub data: Vec<String>,
    pub demo: Vec<String>,
    pub pre_init_hook: Option<String>,
    pub post_init_hook: Option<String>,
    pub uninstall_hook: Option<String>,
    pub models: Vec<ModelSpec>,
    /// Directory the manifest was read from; data files are relative to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ModuleDescriptor {
    /// Minimal installable descriptor, mostly useful to build catalogs in code.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0".to_string(),
            summary: None,
            depends: Vec::new(),
            auto_install: false,
            installable: true,
            data: Vec::new(),
            demo: Vec::new(),
            pre_init_hook: None,
            post_init_hook: None,
            uninstall_hook: None,
            models: Vec::new(),
            path: None,
        }
    }

    /// Directory data files are resolved against.
    pub fn root(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new("."))
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends.contains(&dep) {
                self.depends.push(dep);
            }
        }
        self
    }

    pub fn auto_install(mut self, auto_install: bool) -> Self {
        self.auto_install = auto_install;
        self
    }

    pub fn with_model(mut self, model: ModelSpec) -> Self {
        self.models.push(model);
        self
    }

    /// State a freshly discovered module starts in.
    pub fn initial_state(&self) -> ModuleState {
        if self.installable {
            ModuleState::Uninstalled
        } else {
            ModuleState::Uninstallable
        }
    }
}
