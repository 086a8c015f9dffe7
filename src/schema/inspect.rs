//! Read-only queries against the SQLite catalog.

use crate::registry::model::Model;
use sqlx::SqliteConnection;
use tracing::{error, warn};

/// Columns every model table carries besides its declared fields.
pub const MAGIC_COLUMNS: [&str; 3] = ["id", "create_date", "write_date"];

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ColumnInfo {
    pub name: String,
    #[sqlx(rename = "type")]
    pub column_type: String,
    pub notnull: bool,
}

pub async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await
}

pub async fn index_exists(conn: &mut SqliteConnection, index: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?)",
    )
    .bind(index)
    .fetch_one(&mut *conn)
    .await
}

/// Columns of `table` in declaration order; empty when the table is absent.
pub async fn columns(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<ColumnInfo>, sqlx::Error> {
    sqlx::query_as::<_, ColumnInfo>(
        r#"SELECT name, type, "notnull" FROM pragma_table_info(?) ORDER BY cid"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await
}

/// Names of non-abstract models whose table does not exist. Logs nothing.
pub async fn missing_tables<'a, I>(
    conn: &mut SqliteConnection,
    models: I,
) -> Result<Vec<String>, sqlx::Error>
where
    I: IntoIterator<Item = &'a Model>,
{
    let mut missing = Vec::new();
    for model in models {
        if model.has_table() && !table_exists(conn, &model.table).await? {
            missing.push(model.name.clone());
        }
    }
    Ok(missing)
}

/// Columns present in the model's table that no stored field declares anymore.
pub async fn removed_columns(
    conn: &mut SqliteConnection,
    model: &Model,
) -> Result<Vec<String>, sqlx::Error> {
    if !model.has_table() {
        return Ok(Vec::new());
    }
    let declared: Vec<&str> = model.stored_fields().map(|f| f.name.as_str()).collect();
    Ok(columns(conn, &model.table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .filter(|name| !MAGIC_COLUMNS.contains(&name.as_str()) && !declared.contains(&name.as_str()))
        .collect())
}

/// Log tables still missing after a load pass.
pub fn report_missing(missing: &[String]) {
    for model in missing {
        error!(model = %model, "model has no table");
    }
}

/// Log columns left behind by removed field declarations.
pub fn report_removed(model: &Model, removed: &[String]) {
    for column in removed {
        warn!(
            model = %model.name,
            table = %model.table,
            column = %column,
            "column no longer declared by any module"
        );
    }
}
