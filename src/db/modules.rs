//! Module table access.

use crate::db::models::DbModule;
use ahash::AHashMap;
use chrono::Utc;
use regent_manifest::{Catalog, ModuleState};
use sqlx::SqliteConnection;
use tracing::debug;

/// Synchronise the module table with the catalog found on disk.
///
/// New modules are inserted as `uninstalled` (or `uninstallable`); existing rows
/// get their flags and dependency rows refreshed. Returns the number of new modules.
pub async fn sync_catalog(
    conn: &mut SqliteConnection,
    catalog: &Catalog,
) -> Result<usize, sqlx::Error> {
    let known = all(conn).await?;
    let mut added = 0;

    for module in catalog {
        let now = Utc::now();
        let id: i64 = match known.get(&module.name) {
            Some(row) => {
                let state = match (row.state, module.installable) {
                    (ModuleState::Uninstallable, true) => ModuleState::Uninstalled,
                    (ModuleState::Uninstalled, false) => ModuleState::Uninstallable,
                    (state, _) => state,
                };
                sqlx::query(
                    r#"
                    UPDATE ir_module_module
                    SET auto_install = ?, summary = ?, state = ?, write_date = ?
                    WHERE id = ?
                    "#,
                )
                .bind(module.auto_install)
                .bind(module.summary.as_deref())
                .bind(state.as_str())
                .bind(now)
                .bind(row.id)
                .execute(&mut *conn)
                .await?;
                row.id
            }
            None => {
                added += 1;
                sqlx::query_scalar(
                    r#"
                    INSERT INTO ir_module_module (
                        name, state, auto_install, demo, summary, create_date, write_date
                    )
                    VALUES (?, ?, ?, 0, ?, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(&module.name)
                .bind(module.initial_state().as_str())
                .bind(module.auto_install)
                .bind(module.summary.as_deref())
                .bind(now)
                .bind(now)
                .fetch_one(&mut *conn)
                .await?
            }
        };

        sqlx::query("DELETE FROM ir_module_module_dependency WHERE module_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        for dep in &module.depends {
            sqlx::query("INSERT INTO ir_module_module_dependency (module_id, name) VALUES (?, ?)")
                .bind(id)
                .bind(dep)
                .execute(&mut *conn)
                .await?;
        }
    }

    debug!(modules = catalog.len(), added, "module list updated");
    Ok(added)
}

/// Every module row, keyed by name.
pub async fn all(conn: &mut SqliteConnection) -> Result<AHashMap<String, DbModule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DbModule>(
        r#"
        SELECT id, name, state, latest_version, auto_install, demo, summary, create_date, write_date
        FROM ir_module_module
        ORDER BY name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|row| (row.name.clone(), row)).collect())
}

pub async fn get(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<DbModule>, sqlx::Error> {
    sqlx::query_as::<_, DbModule>(
        r#"
        SELECT id, name, state, latest_version, auto_install, demo, summary, create_date, write_date
        FROM ir_module_module
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
}

/// Move `name` to state `to` if it currently is in one of `from`.
///
/// Returns whether a row changed.
pub async fn transition(
    conn: &mut SqliteConnection,
    name: &str,
    from: &[ModuleState],
    to: ModuleState,
) -> Result<bool, sqlx::Error> {
    let Some(row) = get(conn, name).await? else {
        return Ok(false);
    };
    if !from.contains(&row.state) {
        return Ok(false);
    }
    set_state(conn, name, to).await?;
    Ok(true)
}

pub async fn set_state(
    conn: &mut SqliteConnection,
    name: &str,
    state: ModuleState,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE ir_module_module SET state = ?, write_date = ? WHERE name = ?")
        .bind(state.as_str())
        .bind(Utc::now())
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Record a completed install/upgrade.
pub async fn mark_installed(
    conn: &mut SqliteConnection,
    name: &str,
    version: &str,
    demo_loaded: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE ir_module_module
        SET state = 'installed',
            latest_version = ?,
            demo = demo OR ?,
            write_date = ?
        WHERE name = ?
        "#,
    )
    .bind(version)
    .bind(demo_loaded)
    .bind(Utc::now())
    .bind(name)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Record a completed removal.
pub async fn mark_uninstalled(conn: &mut SqliteConnection, name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE ir_module_module
        SET state = 'uninstalled', latest_version = NULL, demo = 0, write_date = ?
        WHERE name = ?
        "#,
    )
    .bind(Utc::now())
    .bind(name)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Declared dependencies as persisted for `name`.
pub async fn dependencies(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT d.name
        FROM ir_module_module_dependency d
        JOIN ir_module_module m ON m.id = d.module_id
        WHERE m.name = ?
        ORDER BY d.id
        "#,
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await
}
