//! Database module: connection setup and the registry's bookkeeping tables.
//!
//! Layout:
//! - `schema.rs`: SQL DDL for the module, external id and signaling tables
//! - `models.rs`: Rust structs mirroring DB rows
//! - `modules.rs`: module table queries
//! - `external_ids.rs`: external id queries

pub mod external_ids;
pub mod models;
pub mod modules;
pub mod schema;

pub use models::{DbExternalId, DbModule};
pub use schema::{SIGNALING_INIT, SQLITE_INIT};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{SqliteConnection, SqlitePool};
use std::{str::FromStr, time::Duration};
use tracing::info;

/// Open a pool on `database_url`, creating the database file if needed.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(connect_opts)
        .await
}

/// True once the module table exists.
pub async fn is_initialized(conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    crate::schema::table_exists(conn, "ir_module_module").await
}

/// Create the bookkeeping tables.
pub async fn initialize(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    apply_script(conn, SQLITE_INIT).await?;
    info!("database initialized");
    Ok(())
}

/// Execute one of the bookkeeping DDL scripts statement by statement.
///
/// Splits on every `;`, so statements must not contain one in a literal.
pub async fn apply_script(conn: &mut SqliteConnection, script: &str) -> Result<(), sqlx::Error> {
    for stmt in script.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(&mut *conn).await?;
    }
    Ok(())
}
