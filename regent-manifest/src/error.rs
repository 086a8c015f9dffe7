use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Manifest {path} is missing required field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("Manifest {path} declares module '{declared}' but lives in directory '{directory}'")]
    NameMismatch {
        path: PathBuf,
        declared: String,
        directory: String,
    },

    #[error("Module '{module}': {message}")]
    Invalid { module: String, message: String },
}
