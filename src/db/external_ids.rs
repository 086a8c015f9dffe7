//! External ids: stable `(module, name)` handles on records created by data files.

use crate::db::models::DbExternalId;
use chrono::Utc;
use sqlx::SqliteConnection;

/// Split `module.name`; a bare `name` belongs to `default_module`.
pub fn split_xml_id<'a>(reference: &'a str, default_module: &'a str) -> (&'a str, &'a str) {
    match reference.split_once('.') {
        Some((module, name)) => (module, name),
        None => (default_module, reference),
    }
}

pub async fn lookup(
    conn: &mut SqliteConnection,
    module: &str,
    name: &str,
) -> Result<Option<DbExternalId>, sqlx::Error> {
    sqlx::query_as::<_, DbExternalId>(
        r#"
        SELECT id, module, name, model, res_id, noupdate
        FROM ir_model_data
        WHERE module = ? AND name = ?
        "#,
    )
    .bind(module)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
}

/// Create or repoint an external id; returns its row id.
pub async fn upsert(
    conn: &mut SqliteConnection,
    module: &str,
    name: &str,
    model: &str,
    res_id: i64,
    noupdate: bool,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_scalar(
        r#"
        INSERT INTO ir_model_data (module, name, model, res_id, noupdate, create_date, write_date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(module, name) DO UPDATE SET
            model = excluded.model,
            res_id = excluded.res_id,
            noupdate = excluded.noupdate,
            write_date = excluded.write_date
        RETURNING id
        "#,
    )
    .bind(module)
    .bind(name)
    .bind(model)
    .bind(res_id)
    .bind(noupdate)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

pub async fn for_module(
    conn: &mut SqliteConnection,
    module: &str,
) -> Result<Vec<DbExternalId>, sqlx::Error> {
    sqlx::query_as::<_, DbExternalId>(
        r#"
        SELECT id, module, name, model, res_id, noupdate
        FROM ir_model_data
        WHERE module = ?
        ORDER BY id DESC
        "#,
    )
    .bind(module)
    .fetch_all(&mut *conn)
    .await
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM ir_model_data WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
