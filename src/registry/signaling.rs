//! Database-backed counters announcing registry and cache changes to other processes.
//!
//! Every process compares the values it last saw with the current ones before
//! serving a request; the counters carry no locking semantics.

use crate::db::{SIGNALING_INIT, apply_script};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Models or installed modules changed; registries must be rebuilt.
    Registry,
    /// Only derived caches are stale.
    Cache,
}

impl Signal {
    pub fn sequence_name(self) -> &'static str {
        match self {
            Signal::Registry => "base_registry_signaling",
            Signal::Cache => "base_cache_signaling",
        }
    }
}

/// A snapshot of both counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sequences {
    pub registry: i64,
    pub cache: i64,
}

/// Outcome of comparing local sequences with the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Unchanged,
    CachesChanged,
    RegistryChanged,
}

impl Sequences {
    /// Compare locally known values (`self`) with `current`.
    ///
    /// A registry change takes precedence: rebuilding also drops every cache.
    pub fn compare(self, current: Sequences) -> SignalState {
        if self.registry != current.registry {
            SignalState::RegistryChanged
        } else if self.cache != current.cache {
            SignalState::CachesChanged
        } else {
            SignalState::Unchanged
        }
    }
}

/// Create and seed both counters if needed, then read them.
pub async fn setup(pool: &SqlitePool) -> Result<Sequences, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    apply_script(&mut conn, SIGNALING_INIT).await?;
    drop(conn);
    current(pool).await
}

pub async fn current(pool: &SqlitePool) -> Result<Sequences, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT name, last_value FROM registry_signaling")
            .fetch_all(pool)
            .await?;

    let value = |signal: Signal| {
        rows.iter()
            .find(|(name, _)| name == signal.sequence_name())
            .map_or(1, |(_, v)| *v)
    };
    Ok(Sequences {
        registry: value(Signal::Registry),
        cache: value(Signal::Cache),
    })
}

/// Increment one counter atomically and return its new value.
pub async fn advance(pool: &SqlitePool, signal: Signal) -> Result<i64, sqlx::Error> {
    let value: i64 = sqlx::query_scalar(
        "UPDATE registry_signaling SET last_value = last_value + 1 WHERE name = ? RETURNING last_value",
    )
    .bind(signal.sequence_name())
    .fetch_one(pool)
    .await?;
    debug!(sequence = signal.sequence_name(), value, "signaling advanced");
    Ok(value)
}
