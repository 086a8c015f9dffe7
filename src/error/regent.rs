use regent_manifest::ManifestError;
use thiserror::Error as ThisError;

use super::IsFatal;
use super::data::DataError;
use super::graph::GraphError;
use super::schema::SchemaError;

/// Error raised by user-provided module hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, ThisError)]
pub enum RegentError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Module '{module}': hook '{hook}' failed: {source}")]
    Hook {
        module: String,
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("Module '{module}': hook '{hook}' is not registered")]
    MissingHook { module: String, hook: String },

    #[error("Module '{module}' extends unknown model '{model}'")]
    UnknownBaseModel { module: String, model: String },

    #[error("Uninstall of module '{module}' failed: {source}")]
    UninstallFailed {
        module: String,
        #[source]
        source: Box<RegentError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] Box<figment::Error>),

    #[error("Failed to build registry for database '{db_name}': {source}")]
    BuildFailed {
        db_name: String,
        #[source]
        source: Box<RegentError>,
    },

    #[error("Invalid database name '{0}'")]
    InvalidDatabaseName(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl RegentError {
    pub(crate) fn build_failed(db_name: &str, source: RegentError) -> Self {
        match source {
            already @ RegentError::BuildFailed { .. } => already,
            other => RegentError::BuildFailed {
                db_name: db_name.to_string(),
                source: Box::new(other),
            },
        }
    }
}

impl IsFatal for RegentError {
    fn is_fatal(&self) -> bool {
        match self {
            RegentError::Manifest(_)
            | RegentError::Graph(_)
            | RegentError::UninstallFailed { .. }
            | RegentError::ConfigError(_)
            | RegentError::BuildFailed { .. }
            | RegentError::InvalidDatabaseName(_)
            | RegentError::UnexpectedError(_) => true,
            RegentError::Schema(_)
            | RegentError::Data(_)
            | RegentError::Hook { .. }
            | RegentError::MissingHook { .. }
            | RegentError::UnknownBaseModel { .. }
            | RegentError::IoError(_)
            | RegentError::DatabaseError(_) => false,
        }
    }
}
