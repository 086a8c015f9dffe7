use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum GraphError {
    #[error("Unknown module(s): {}", .0.join(", "))]
    UnknownModules(Vec<String>),

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    MissingDependency { module: String, dependency: String },

    #[error("Module '{module}' is not installable{}", .required_by.as_ref().map(|m| format!(" (required by '{m}')")).unwrap_or_default())]
    NotInstallable {
        module: String,
        required_by: Option<String>,
    },

    #[error("Dependency cycle between modules: {}", .modules.join(" -> "))]
    Cycle { modules: Vec<String> },
}
