//! Record loader for module data and demo files.
//!
//! `.toml` files hold `[[record]]` tables keyed by external id; `.sql` files are
//! executed as one script. Every record written through a `.toml` file
//! is tracked in `ir_model_data`, which makes reloading a file idempotent.

use crate::db::external_ids;
use crate::error::DataError;
use crate::registry::{Model, ModelMap};
use ahash::AHashSet;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DataFile {
    #[serde(default)]
    record: Vec<RecordSpec>,
}

#[derive(Debug, Deserialize)]
struct RecordSpec {
    id: String,
    model: String,
    #[serde(default)]
    noupdate: bool,
    #[serde(default)]
    values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// External ids (`module`, `name`) written while loading a module.
pub type LoadedIds = AHashSet<(String, String)>;

/// Loads the files of one module inside that module's transaction.
pub struct DataLoader<'a> {
    module: &'a str,
    root: &'a Path,
    models: &'a ModelMap,
    loaded: LoadedIds,
}

impl<'a> DataLoader<'a> {
    pub fn new(module: &'a str, root: &'a Path, models: &'a ModelMap) -> Self {
        Self {
            module,
            root,
            models,
            loaded: LoadedIds::default(),
        }
    }

    pub fn into_loaded(self) -> LoadedIds {
        self.loaded
    }

    /// Load `files` (relative to the module directory) in order.
    pub async fn load_files(
        &mut self,
        conn: &mut SqliteConnection,
        files: &[String],
    ) -> Result<usize, DataError> {
        let mut records = 0;
        for file in files {
            records += self.load_file(conn, file).await?;
        }
        Ok(records)
    }

    /// Returns the number of records written or kept.
    pub async fn load_file(
        &mut self,
        conn: &mut SqliteConnection,
        file: &str,
    ) -> Result<usize, DataError> {
        let path = self.root.join(file);
        let content = std::fs::read_to_string(&path).map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "sql" => {
                sqlx::raw_sql(&content).execute(&mut *conn).await?;
                debug!(module = self.module, file, "sql file executed");
                Ok(0)
            }
            "toml" => {
                let data: DataFile = toml::from_str(&content)
                    .map_err(|source| DataError::Parse { path, source })?;
                for record in &data.record {
                    self.load_record(conn, record).await?;
                }
                debug!(module = self.module, file, records = data.record.len(), "data file loaded");
                Ok(data.record.len())
            }
            _ => Err(DataError::UnsupportedFile(path)),
        }
    }

    async fn load_record(
        &mut self,
        conn: &mut SqliteConnection,
        record: &RecordSpec,
    ) -> Result<(), DataError> {
        let (xml_module, xml_name) = external_ids::split_xml_id(&record.id, self.module);
        let xml_id = format!("{xml_module}.{xml_name}");

        let model = self
            .models
            .get(&record.model)
            .filter(|m| m.has_table())
            .ok_or_else(|| DataError::UnknownModel {
                xml_id: xml_id.clone(),
                model: record.model.clone(),
            })?;

        let mut values = Vec::with_capacity(record.values.len());
        for (field_name, raw) in &record.values {
            let valid = model.field(field_name).is_some_and(|f| f.has_column());
            if !valid {
                return Err(DataError::UnknownField {
                    xml_id,
                    model: model.name.clone(),
                    field: field_name.clone(),
                });
            }
            let value = self.resolve_value(conn, &xml_id, field_name, raw).await?;
            values.push((field_name.as_str(), value));
        }

        let existing = external_ids::lookup(conn, xml_module, xml_name).await?;
        let live = match &existing {
            Some(ext) if ext.model == model.name => record_exists(conn, model, ext.res_id).await?,
            _ => false,
        };

        match existing {
            Some(ext) if live => {
                if ext.noupdate {
                    debug!(xml_id = %xml_id, "noupdate record kept as is");
                } else {
                    update_record(conn, model, ext.res_id, &values).await?;
                }
            }
            _ => {
                let res_id = insert_record(conn, model, &values).await?;
                external_ids::upsert(
                    conn,
                    xml_module,
                    xml_name,
                    &model.name,
                    res_id,
                    record.noupdate,
                )
                .await?;
            }
        }

        self.loaded
            .insert((xml_module.to_string(), xml_name.to_string()));
        Ok(())
    }

    async fn resolve_value(
        &self,
        conn: &mut SqliteConnection,
        xml_id: &str,
        field: &str,
        raw: &Value,
    ) -> Result<SqlValue, DataError> {
        let unsupported = || DataError::UnsupportedValue {
            xml_id: xml_id.to_string(),
            field: field.to_string(),
        };
        Ok(match raw {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().ok_or_else(unsupported)?),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Object(map) => {
                let reference = map
                    .get("ref")
                    .and_then(Value::as_str)
                    .filter(|_| map.len() == 1)
                    .ok_or_else(unsupported)?;
                let (module, name) = external_ids::split_xml_id(reference, self.module);
                let target = external_ids::lookup(conn, module, name)
                    .await?
                    .ok_or_else(|| DataError::UnresolvedRef(format!("{module}.{name}")))?;
                SqlValue::Int(target.res_id)
            }
            Value::Array(_) => return Err(unsupported()),
        })
    }
}

async fn record_exists(
    conn: &mut SqliteConnection,
    model: &Model,
    res_id: i64,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE id = ?)",
        model.table
    );
    sqlx::query_scalar(&sql).bind(res_id).fetch_one(&mut *conn).await
}

async fn insert_record(
    conn: &mut SqliteConnection,
    model: &Model,
    values: &[(&str, SqlValue)],
) -> Result<i64, sqlx::Error> {
    let mut columns = vec!["\"create_date\"".to_string(), "\"write_date\"".to_string()];
    columns.extend(values.iter().map(|(name, _)| format!("\"{name}\"")));
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({placeholders}) RETURNING id",
        model.table,
        columns.join(", ")
    );

    let now = Utc::now();
    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(now).bind(now);
    for (_, value) in values {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query.fetch_one(&mut *conn).await
}

async fn update_record(
    conn: &mut SqliteConnection,
    model: &Model,
    res_id: i64,
    values: &[(&str, SqlValue)],
) -> Result<(), sqlx::Error> {
    let mut assignments = vec!["\"write_date\" = ?".to_string()];
    assignments.extend(values.iter().map(|(name, _)| format!("\"{name}\" = ?")));
    let sql = format!(
        "UPDATE \"{}\" SET {} WHERE id = ?",
        model.table,
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql).bind(Utc::now());
    for (_, value) in values {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query.bind(res_id).execute(&mut *conn).await?;
    Ok(())
}

/// Delete the record behind an external id, then the external id itself.
async fn delete_referenced(
    conn: &mut SqliteConnection,
    models: &ModelMap,
    ext: &crate::db::DbExternalId,
) -> Result<(), DataError> {
    match models.get(&ext.model).filter(|m| m.has_table()) {
        Some(model) => {
            let sql = format!("DELETE FROM \"{}\" WHERE id = ?", model.table);
            sqlx::query(&sql).bind(ext.res_id).execute(&mut *conn).await?;
        }
        None => warn!(
            xml_id = %ext.complete_name(),
            model = %ext.model,
            "record of unknown model left in place"
        ),
    }
    external_ids::delete(conn, ext.id).await?;
    Ok(())
}

/// Remove records `module` created earlier but no longer loads.
///
/// `noupdate` records survive. Returns the number of external ids removed.
pub async fn process_end(
    conn: &mut SqliteConnection,
    module: &str,
    loaded: &LoadedIds,
    models: &ModelMap,
) -> Result<usize, DataError> {
    let mut removed = 0;
    for ext in external_ids::for_module(conn, module).await? {
        if ext.noupdate || loaded.contains(&(ext.module.clone(), ext.name.clone())) {
            continue;
        }
        debug!(xml_id = %ext.complete_name(), "deleting orphan record");
        delete_referenced(conn, models, &ext).await?;
        removed += 1;
    }
    Ok(removed)
}

/// Remove every record `module` owns through its external ids, newest first.
pub async fn remove_module_records(
    conn: &mut SqliteConnection,
    module: &str,
    models: &ModelMap,
) -> Result<usize, DataError> {
    let owned = external_ids::for_module(conn, module).await?;
    for ext in &owned {
        delete_referenced(conn, models, ext).await?;
    }
    Ok(owned.len())
}
