#![allow(dead_code)]

use regent::{Config, NoopLock, RegistryCache};
use sqlx::SqlitePool;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway addons directory plus data directory.
pub struct Fixture {
    pub dir: TempDir,
    pub addons: PathBuf,
    pub data: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let addons = dir.path().join("addons");
        let data = dir.path().join("data");
        fs::create_dir_all(&addons).unwrap();
        Self { dir, addons, data }
    }

    /// Write `addons/<name>/manifest.toml`; the `name` key is added automatically.
    pub fn module(&self, name: &str, body: &str) -> PathBuf {
        let path = self.addons.join(name);
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join("manifest.toml"),
            format!("name = \"{name}\"\n{body}"),
        )
        .unwrap();
        path
    }

    /// Write a file inside a module directory.
    pub fn file(&self, module: &str, relative: &str, contents: &str) {
        let path = self.addons.join(module).join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.basic.data_dir = self.data.clone();
        cfg.basic.addons_path = vec![self.addons.clone()];
        cfg.registry.lru_size = Some(8);
        cfg.registry.pool_size = 2;
        cfg
    }

    pub fn cache(&self) -> RegistryCache {
        RegistryCache::new(self.config(), Arc::new(NoopLock))
    }

    pub fn cache_with(&self, cfg: Config) -> RegistryCache {
        RegistryCache::new(cfg, Arc::new(NoopLock))
    }
}

pub async fn module_state(pool: &SqlitePool, name: &str) -> Option<String> {
    sqlx::query_scalar("SELECT state FROM ir_module_module WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .unwrap()
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
    let mut conn = pool.acquire().await.unwrap();
    regent::schema::table_exists(&mut conn, table).await.unwrap()
}
