use chrono::{DateTime, Utc};
use regent_manifest::ModuleState;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbModule {
    pub id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub state: ModuleState,
    pub latest_version: Option<String>,
    pub auto_install: bool,
    /// Demo data has been loaded for this module.
    pub demo: bool,
    pub summary: Option<String>,
    pub create_date: DateTime<Utc>,
    pub write_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbExternalId {
    pub id: i64,
    pub module: String,
    pub name: String,
    pub model: String,
    pub res_id: i64,
    pub noupdate: bool,
}

impl DbExternalId {
    /// Fully qualified `module.name` form.
    pub fn complete_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}
