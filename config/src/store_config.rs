use serde::{Deserialize, Serialize};

use crate::CacheConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default = "Default::default")]
    pub chunk_cache: CacheConfig,

    #[serde(default = "StoreConfig::default_write_dedupe_cache")]
    pub write_dedupe_cache: CacheConfig,

    /// Only route index entries ending before now minus this period through
    /// the write-dedupe cache, in milliseconds. 0 dedupes everything.
    #[serde(default = "StoreConfig::default_cache_lookups_older_than")]
    pub cache_lookups_older_than: i64,

    /// Clamps query start times to now minus this period, in milliseconds.
    /// 0 disables the clamp.
    #[serde(default = "StoreConfig::default_max_look_back_period")]
    pub max_look_back_period: i64,

    /// Write a fixed stub to the chunk cache instead of the payload. Used to
    /// drive write dedup without paying cache storage.
    #[serde(default = "StoreConfig::default_chunk_cache_stubs")]
    pub chunk_cache_stubs: bool,
}

impl StoreConfig {
    fn default_write_dedupe_cache() -> CacheConfig {
        CacheConfig {
            enabled: false,
            ..Default::default()
        }
    }

    fn default_cache_lookups_older_than() -> i64 {
        0
    }

    fn default_max_look_back_period() -> i64 {
        0
    }

    fn default_chunk_cache_stubs() -> bool {
        false
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_cache: Default::default(),
            write_dedupe_cache: Self::default_write_dedupe_cache(),
            cache_lookups_older_than: Self::default_cache_lookups_older_than(),
            max_look_back_period: Self::default_max_look_back_period(),
            chunk_cache_stubs: Self::default_chunk_cache_stubs(),
        }
    }
}
