use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockStoreConfig {
    /// Seconds between block catalog syncs. 0 disables the sync loop, which
    /// leaves every bucket store empty.
    #[serde(default = "BlockStoreConfig::default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// How many tenants sync concurrently.
    #[serde(default = "BlockStoreConfig::default_tenant_sync_concurrency")]
    pub tenant_sync_concurrency: usize,

    /// How many block metas one tenant fetches concurrently.
    #[serde(default = "BlockStoreConfig::default_meta_sync_concurrency")]
    pub meta_sync_concurrency: usize,

    /// Blocks younger than this many seconds are hidden from the catalog
    /// until object-store listings are assumed consistent.
    #[serde(default = "BlockStoreConfig::default_consistency_delay_secs")]
    pub consistency_delay_secs: u64,

    /// Upper bound on bytes of chunk data a single Series call may buffer.
    #[serde(default = "BlockStoreConfig::default_max_chunk_pool_bytes")]
    pub max_chunk_pool_bytes: usize,

    /// Concurrent queries served per bucket store.
    #[serde(default = "BlockStoreConfig::default_max_concurrent")]
    pub max_concurrent: usize,
}

impl BlockStoreConfig {
    fn default_sync_interval_secs() -> u64 {
        300
    }

    fn default_tenant_sync_concurrency() -> usize {
        10
    }

    fn default_meta_sync_concurrency() -> usize {
        20
    }

    fn default_consistency_delay_secs() -> u64 {
        0
    }

    fn default_max_chunk_pool_bytes() -> usize {
        2 * 1024 * 1024 * 1024
    }

    fn default_max_concurrent() -> usize {
        100
    }
}

impl Default for BlockStoreConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: Self::default_sync_interval_secs(),
            tenant_sync_concurrency: Self::default_tenant_sync_concurrency(),
            meta_sync_concurrency: Self::default_meta_sync_concurrency(),
            consistency_delay_secs: Self::default_consistency_delay_secs(),
            max_chunk_pool_bytes: Self::default_max_chunk_pool_bytes(),
            max_concurrent: Self::default_max_concurrent(),
        }
    }
}
