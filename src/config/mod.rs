mod basic;
mod registry;

pub use basic::{BasicConfig, validate_db_name};
pub use registry::RegistryConfig;

use crate::error::RegentError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Paths, logging and version settings (see `basic` table in regent.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Registry cache and signaling (see `registry` table in regent.toml).
    #[serde(default)]
    pub registry: RegistryConfig,
}

const DEFAULT_CONFIG_FILE: &str = "regent.toml";
const ENV_PREFIX: &str = "REGENT_";

impl Config {
    /// Builds a Figment that merges defaults, a TOML file and `REGENT_*` variables.
    ///
    /// Without an explicit `path`, `regent.toml` is used when present. Nested keys
    /// use a double underscore: `REGENT_REGISTRY__LRU_SIZE=8`.
    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
            }
            None => figment,
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, RegentError> {
        if let Some(path) = path.filter(|p| !p.is_file()) {
            return Err(RegentError::UnexpectedError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let cfg: Self = Self::figment(path).extract().map_err(Box::new)?;
        if cfg.basic.addons_path.is_empty() {
            return Err(RegentError::UnexpectedError(
                "basic.addons_path must name at least one directory".to_string(),
            ));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[basic]\nserver_series = 17.0\nwithout_demo = true\n\n[registry]\nlru_size = 2"
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.basic.server_series, "17.0");
        assert!(cfg.basic.without_demo);
        assert_eq!(cfg.registry.lru_capacity(), 2);
        assert!(cfg.registry.multi_process);
        assert_eq!(cfg.basic.loglevel, "info");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/regent.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn database_names_are_validated() {
        let cfg = Config::default();
        assert!(cfg.basic.database_url("prod_db").unwrap().ends_with("prod_db.sqlite"));
        assert!(cfg.basic.database_url("../etc").is_err());
        assert!(cfg.basic.database_url("").is_err());
    }
}
