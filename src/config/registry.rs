use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Registry cache and signaling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Fixed number of registries kept in memory. Overrides the memory-based sizing.
    /// TOML: `registry.lru_size`. Default: unset.
    #[serde(default)]
    pub lru_size: Option<usize>,

    /// Soft memory limit of the process, in bytes.
    /// TOML: `registry.limit_memory_soft`. Default: 2 GiB.
    #[serde(default = "default_limit_memory_soft")]
    pub limit_memory_soft: u64,

    /// Assumed footprint of one registry, in bytes.
    /// TOML: `registry.avg_registry_size`. Default: 15 MiB.
    #[serde(default = "default_avg_registry_size")]
    pub avg_registry_size: u64,

    /// Entries per registry in the derived-value cache.
    /// TOML: `registry.cache_capacity`. Default: `8192`.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Several processes share the databases; enables sequence signaling.
    /// TOML: `registry.multi_process`. Default: `true`.
    #[serde(default = "default_multi_process")]
    pub multi_process: bool,

    /// Connections per database pool.
    /// TOML: `registry.pool_size`. Default: `4`.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lru_size: None,
            limit_memory_soft: default_limit_memory_soft(),
            avg_registry_size: default_avg_registry_size(),
            cache_capacity: default_cache_capacity(),
            multi_process: default_multi_process(),
            pool_size: default_pool_size(),
        }
    }
}

impl RegistryConfig {
    /// Number of registries the cache may hold.
    ///
    /// An explicit `lru_size` wins. Otherwise Unix targets divide the soft memory
    /// limit by the average registry size and other targets use 42. Never zero.
    pub fn lru_capacity(&self) -> usize {
        if let Some(size) = self.lru_size {
            return size.max(1);
        }
        if cfg!(unix) {
            let slots = self.limit_memory_soft / self.avg_registry_size.max(1);
            usize::try_from(slots).unwrap_or(usize::MAX).max(1)
        } else {
            42
        }
    }
}

fn default_limit_memory_soft() -> u64 {
    2048 * MIB
}

fn default_avg_registry_size() -> u64 {
    15 * MIB
}

fn default_cache_capacity() -> u64 {
    8192
}

fn default_multi_process() -> bool {
    true
}

fn default_pool_size() -> u32 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_size_overrides_memory_sizing() {
        let cfg = RegistryConfig {
            lru_size: Some(3),
            ..RegistryConfig::default()
        };
        assert_eq!(cfg.lru_capacity(), 3);

        let cfg = RegistryConfig {
            lru_size: Some(0),
            ..RegistryConfig::default()
        };
        assert_eq!(cfg.lru_capacity(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn capacity_follows_soft_memory_limit() {
        let cfg = RegistryConfig::default();
        assert_eq!(cfg.lru_capacity(), 136);

        let tiny = RegistryConfig {
            limit_memory_soft: MIB,
            ..RegistryConfig::default()
        };
        assert_eq!(tiny.lru_capacity(), 1);
    }
}
