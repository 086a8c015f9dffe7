//! Additive schema reconciliation.
//!
//! Tables, columns, indexes and relation tables are created when missing and
//! never dropped. Type or nullability drift is reported, not repaired.

mod inspect;

pub use inspect::{
    ColumnInfo, MAGIC_COLUMNS, columns, index_exists, missing_tables, removed_columns,
    report_missing, report_removed, table_exists,
};

use crate::error::SchemaError;
use crate::registry::model::{Model, ModelMap};
use regent_manifest::{FieldSpec, FieldType};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

/// What one reconciliation call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaChanges {
    pub created_tables: Vec<String>,
    /// `table.column` entries.
    pub added_columns: Vec<String>,
    pub created_indexes: Vec<String>,
    pub relation_tables: Vec<String>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        self.created_tables.is_empty()
            && self.added_columns.is_empty()
            && self.created_indexes.is_empty()
            && self.relation_tables.is_empty()
    }

    pub fn extend(&mut self, other: SchemaChanges) {
        self.created_tables.extend(other.created_tables);
        self.added_columns.extend(other.added_columns);
        self.created_indexes.extend(other.created_indexes);
        self.relation_tables.extend(other.relation_tables);
    }
}

/// Bring the database in line with `model`.
///
/// `models` resolves the tables of relational targets.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    model: &Model,
    models: &ModelMap,
) -> Result<SchemaChanges, SchemaError> {
    let mut changes = SchemaChanges::default();
    if !model.has_table() {
        return Ok(changes);
    }
    let table = check_identifier(&model.table)?;

    if table_exists(conn, table).await? {
        add_missing_columns(conn, model, models, &mut changes).await?;
    } else {
        create_table(conn, model, models).await?;
        info!(model = %model.name, table = %table, "table created");
        changes.created_tables.push(table.to_string());
    }

    for field in model.stored_fields() {
        if field.unique {
            let index = format!("{table}_{}_unique", field.name);
            create_index(conn, &index, table, &field.name, true, &mut changes).await?;
        } else if field.index {
            let index = format!("{table}_{}_index", field.name);
            create_index(conn, &index, table, &field.name, false, &mut changes).await?;
        }
    }

    for field in model.fields.iter().filter(|f| f.kind == FieldType::Many2many && f.store) {
        let comodel = comodel_of(model, field, models)?;
        if let Some(rel) = create_relation_table(conn, model, comodel).await? {
            changes.relation_tables.push(rel);
        }
    }

    if !changes.is_empty() {
        debug!(model = %model.name, ?changes, "schema reconciled");
    }
    Ok(changes)
}

async fn create_table(
    conn: &mut SqliteConnection,
    model: &Model,
    models: &ModelMap,
) -> Result<(), SchemaError> {
    let mut defs = vec![
        "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "\"create_date\" TIMESTAMP".to_string(),
        "\"write_date\" TIMESTAMP".to_string(),
    ];
    for field in model.stored_fields() {
        defs.push(column_definition(model, field, models, true)?);
    }
    let sql = format!("CREATE TABLE \"{}\" ({})", model.table, defs.join(", "));
    sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(())
}

async fn add_missing_columns(
    conn: &mut SqliteConnection,
    model: &Model,
    models: &ModelMap,
    changes: &mut SchemaChanges,
) -> Result<(), SchemaError> {
    let existing = columns(conn, &model.table).await?;

    for field in model.stored_fields() {
        let declared = field.kind.column_type().unwrap_or_default();
        match existing.iter().find(|c| c.name == field.name) {
            Some(column) => {
                if !column.column_type.eq_ignore_ascii_case(declared) {
                    warn!(
                        model = %model.name,
                        column = %field.name,
                        actual = %column.column_type,
                        declared,
                        "column type differs from its declaration"
                    );
                }
                if field.required && !column.notnull {
                    debug!(model = %model.name, column = %field.name, "required column is nullable");
                }
            }
            None => {
                let can_enforce = field.required && default_literal(field).is_some();
                if field.required && !can_enforce {
                    warn!(
                        model = %model.name,
                        column = %field.name,
                        "required column added as nullable: existing rows have no value"
                    );
                }
                let def = column_definition(model, field, models, can_enforce)?;
                let sql = format!("ALTER TABLE \"{}\" ADD COLUMN {def}", model.table);
                sqlx::query(&sql).execute(&mut *conn).await?;
                info!(model = %model.name, column = %field.name, "column added");
                changes
                    .added_columns
                    .push(format!("{}.{}", model.table, field.name));
            }
        }
    }
    Ok(())
}

fn column_definition(
    model: &Model,
    field: &FieldSpec,
    models: &ModelMap,
    enforce_required: bool,
) -> Result<String, SchemaError> {
    let name = check_identifier(&field.name)?;
    let column_type = field.kind.column_type().unwrap_or("TEXT");
    let mut def = format!("\"{name}\" {column_type}");

    let default = default_literal(field);
    if enforce_required && field.required {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = default {
        def.push_str(" DEFAULT ");
        def.push_str(&default);
    }
    if field.kind == FieldType::Many2one {
        let comodel = comodel_of(model, field, models)?;
        if comodel.has_table() {
            let target = check_identifier(&comodel.table)?;
            def.push_str(&format!(" REFERENCES \"{target}\"(\"id\") ON DELETE SET NULL"));
        }
    }
    Ok(def)
}

async fn create_index(
    conn: &mut SqliteConnection,
    index: &str,
    table: &str,
    column: &str,
    unique: bool,
    changes: &mut SchemaChanges,
) -> Result<(), SchemaError> {
    let index = check_identifier(index)?;
    let column = check_identifier(column)?;
    if index_exists(conn, index).await? {
        return Ok(());
    }
    let kind = if unique { "UNIQUE INDEX" } else { "INDEX" };
    let sql = format!("CREATE {kind} \"{index}\" ON \"{table}\" (\"{column}\")");
    sqlx::query(&sql).execute(&mut *conn).await?;
    changes.created_indexes.push(index.to_string());
    Ok(())
}

/// Relation table of a many2many field between `model` and `comodel`.
///
/// Returns the table name when it had to be created.
async fn create_relation_table(
    conn: &mut SqliteConnection,
    model: &Model,
    comodel: &Model,
) -> Result<Option<String>, SchemaError> {
    let (rel, col1, col2) = relation_names(&model.table, &comodel.table);
    let rel = check_identifier(&rel)?.to_string();
    if table_exists(conn, &rel).await? {
        return Ok(None);
    }
    let sql = format!(
        "CREATE TABLE \"{rel}\" (\
         \"{col1}\" INTEGER NOT NULL REFERENCES \"{}\"(\"id\") ON DELETE CASCADE, \
         \"{col2}\" INTEGER NOT NULL REFERENCES \"{}\"(\"id\") ON DELETE CASCADE, \
         PRIMARY KEY (\"{col1}\", \"{col2}\"))",
        model.table, comodel.table
    );
    sqlx::query(&sql).execute(&mut *conn).await?;
    info!(table = %rel, "relation table created");
    Ok(Some(rel))
}

/// Relation table and column names for a many2many between two tables.
pub fn relation_names(table: &str, cotable: &str) -> (String, String, String) {
    let (first, second) = if table <= cotable {
        (table, cotable)
    } else {
        (cotable, table)
    };
    let rel = format!("{first}_{second}_rel");
    if table == cotable {
        (rel, "id1".to_string(), "id2".to_string())
    } else {
        (rel, format!("{table}_id"), format!("{cotable}_id"))
    }
}

fn comodel_of<'a>(
    model: &Model,
    field: &FieldSpec,
    models: &'a ModelMap,
) -> Result<&'a Model, SchemaError> {
    let comodel = field.comodel.as_deref().unwrap_or_default();
    models
        .get(comodel)
        .ok_or_else(|| SchemaError::UnknownComodel {
            model: model.name.clone(),
            field: field.name.clone(),
            comodel: comodel.to_string(),
        })
}

/// SQL literal for a field default, when it has a scalar one.
fn default_literal(field: &FieldSpec) -> Option<String> {
    match field.default.as_ref()? {
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Accept lowercase ASCII identifiers of at most 63 bytes.
pub fn check_identifier(name: &str) -> Result<&str, SchemaError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_restricted() {
        assert!(check_identifier("res_partner").is_ok());
        assert!(check_identifier("x2").is_ok());
        assert!(check_identifier("2x").is_err());
        assert!(check_identifier("res.partner").is_err());
        assert!(check_identifier("name\"; DROP TABLE x; --").is_err());
        assert!(check_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn relation_names_are_symmetric() {
        let (rel_a, _, _) = relation_names("res_partner", "res_category");
        let (rel_b, col1, col2) = relation_names("res_category", "res_partner");
        assert_eq!(rel_a, "res_category_res_partner_rel");
        assert_eq!(rel_a, rel_b);
        assert_eq!(col1, "res_category_id");
        assert_eq!(col2, "res_partner_id");

        let (_, c1, c2) = relation_names("res_partner", "res_partner");
        assert_eq!((c1.as_str(), c2.as_str()), ("id1", "id2"));
    }

    #[test]
    fn defaults_render_as_sql_literals() {
        let mut field = FieldSpec::new("note", FieldType::Char);
        field.default = Some(Value::String("it's".to_string()));
        assert_eq!(default_literal(&field).as_deref(), Some("'it''s'"));
        field.default = Some(Value::Bool(true));
        assert_eq!(default_literal(&field).as_deref(), Some("1"));
        field.default = Some(serde_json::json!([1, 2]));
        assert_eq!(default_literal(&field), None);
    }
}
