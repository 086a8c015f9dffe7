use crate::error::RegentError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Basic (core) configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// Directory holding one SQLite file per database.
    /// TOML: `basic.data_dir`. Default: `data`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directories scanned for modules, in priority order.
    /// TOML: `basic.addons_path`. Default: `["addons"]`.
    #[serde(default = "default_addons_path")]
    pub addons_path: Vec<PathBuf>,

    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default)]
    pub loglevel: String,

    /// Server series prefixed to module versions (`1.0` + `2.1` -> `1.0.2.1`).
    /// TOML: `basic.server_series`. Default: `1.0`.
    #[serde(default = "default_server_series")]
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub server_series: String,

    /// Never load demo data for new installs.
    /// TOML: `basic.without_demo`. Default: `false`.
    #[serde(default)]
    pub without_demo: bool,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            addons_path: default_addons_path(),
            loglevel: "info".to_string(),
            server_series: default_server_series(),
            without_demo: false,
        }
    }
}

impl BasicConfig {
    /// SQLite URL of database `db_name` under `data_dir`.
    pub fn database_url(&self, db_name: &str) -> Result<String, RegentError> {
        validate_db_name(db_name)?;
        let path = self.data_dir.join(format!("{db_name}.sqlite"));
        Ok(format!("sqlite://{}", path.display()))
    }
}

/// Database names become file names: letters, digits, `_`, `-` and inner dots only.
pub fn validate_db_name(db_name: &str) -> Result<(), RegentError> {
    let valid = !db_name.is_empty()
        && !db_name.starts_with('.')
        && db_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RegentError::InvalidDatabaseName(db_name.to_string()))
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected a string or a number for basic.server_series",
        )),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_addons_path() -> Vec<PathBuf> {
    vec![PathBuf::from("addons")]
}

fn default_server_series() -> String {
    "1.0".to_string()
}
