use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DataError {
    #[error("Failed to read data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid data file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported data file type: {0}")]
    UnsupportedFile(PathBuf),

    #[error("Record '{xml_id}' targets unknown model '{model}'")]
    UnknownModel { xml_id: String, model: String },

    #[error("Record '{xml_id}' sets unknown or non-stored field '{model}.{field}'")]
    UnknownField {
        xml_id: String,
        model: String,
        field: String,
    },

    #[error("Record '{xml_id}' has an unsupported value for field '{field}'")]
    UnsupportedValue { xml_id: String, field: String },

    #[error("External id '{0}' not found")]
    UnresolvedRef(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
