use std::collections::HashMap;
use std::sync::Arc;

use models::{Labels, Matcher, TimeRange, Timestamp};
use parking_lot::RwLock;
use prometheus::{IntGauge, Opts, Registry};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{ChunkPoolExhaustedSnafu, CommonSnafu, Result};
use crate::index_cache::IndexCache;
use crate::meta::{BlockMeta, MetaFetcher};

/// In-memory catalog of one tenant's TSDB blocks, refreshed from object
/// storage. Created lazily on first observation of the tenant prefix and
/// kept for the life of the process.
pub struct BucketStore {
    user_id: String,
    fetcher: MetaFetcher,
    metas: RwLock<HashMap<String, BlockMeta>>,
    index_cache: Arc<IndexCache>,
    query_permits: Semaphore,
    max_chunk_pool_bytes: usize,
    // Per-tenant registry so tests and debug handlers can scrape one
    // tenant's gauges in isolation.
    registry: Registry,
    blocks_loaded: IntGauge,
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("user_id", &self.user_id)
            .field("blocks", &self.block_count())
            .finish()
    }
}

impl BucketStore {
    pub fn new(
        user_id: impl Into<String>,
        fetcher: MetaFetcher,
        index_cache: Arc<IndexCache>,
        max_concurrent: usize,
        max_chunk_pool_bytes: usize,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let registry = Registry::new();
        let blocks_loaded = IntGauge::with_opts(
            Opts::new("blocks_loaded", "Number of blocks in the tenant catalog")
                .namespace("cortex")
                .const_label("user", user_id.clone()),
        )
        .map_err(|e| {
            CommonSnafu {
                reason: format!("cannot create bucket store gauge: {}", e),
            }
            .build()
        })?;
        registry.register(Box::new(blocks_loaded.clone())).map_err(|e| {
            CommonSnafu {
                reason: format!("cannot register bucket store gauge: {}", e),
            }
            .build()
        })?;

        Ok(Self {
            user_id,
            fetcher,
            metas: RwLock::new(HashMap::new()),
            index_cache,
            query_permits: Semaphore::new(max_concurrent.max(1)),
            max_chunk_pool_bytes,
            registry,
            blocks_loaded,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// First sync after creation; required before the store can serve.
    pub async fn initial_sync(&self) -> Result<()> {
        self.sync_blocks().await
    }

    /// Refreshes the catalog: new blocks appear, vanished blocks drop out.
    pub async fn sync_blocks(&self) -> Result<()> {
        let fetched = self.fetcher.fetch().await?;
        debug!("user {}: {} blocks after sync", self.user_id, fetched.len());
        self.blocks_loaded.set(fetched.len() as i64);
        *self.metas.write() = fetched;
        self.index_cache.invalidate_user(&self.user_id);
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.metas.read().len()
    }

    /// Covered interval and block count of the catalog.
    pub fn info(&self) -> (Timestamp, Timestamp, u64) {
        let metas = self.metas.read();
        let mut min_time = 0;
        let mut max_time = 0;
        for (i, meta) in metas.values().enumerate() {
            if i == 0 {
                min_time = meta.min_time;
                max_time = meta.max_time;
            } else {
                min_time = min_time.min(meta.min_time);
                max_time = max_time.max(meta.max_time);
            }
        }
        (min_time, max_time, metas.len() as u64)
    }

    /// Series from blocks overlapping the range that satisfy every matcher,
    /// deduped across blocks. Result size is bounded by the chunk pool
    /// budget; concurrent calls by the permit pool.
    pub async fn series(&self, range: TimeRange, matchers: &[Matcher]) -> Result<Vec<Labels>> {
        let _permit = self.query_permits.acquire().await.map_err(|_| {
            CommonSnafu {
                reason: "bucket store is shutting down".to_string(),
            }
            .build()
        })?;

        let metas = self.metas.read();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut pooled_bytes = 0usize;
        for meta in metas.values() {
            if !TimeRange::new(meta.min_time, meta.max_time).overlaps(&range) {
                continue;
            }
            for series in &meta.series {
                if !matchers
                    .iter()
                    .all(|m| m.matches(series.get(&m.name).unwrap_or("")))
                {
                    continue;
                }
                if !seen.insert(series.clone()) {
                    continue;
                }
                pooled_bytes += series
                    .iter()
                    .map(|l| l.name.len() + l.value.len())
                    .sum::<usize>();
                if pooled_bytes > self.max_chunk_pool_bytes {
                    return ChunkPoolExhaustedSnafu {
                        limit: self.max_chunk_pool_bytes,
                    }
                    .fail();
                }
                out.push(series.clone());
            }
        }
        Ok(out)
    }

    pub async fn label_names(&self, range: TimeRange) -> Result<Vec<String>> {
        let cache_key = format!("{}/names/{}:{}", self.user_id, range.min_ts, range.max_ts);
        if let Some(names) = self.index_cache.get(&cache_key) {
            return Ok(names);
        }

        let metas = self.metas.read();
        let mut names = Vec::new();
        for meta in metas.values() {
            if !TimeRange::new(meta.min_time, meta.max_time).overlaps(&range) {
                continue;
            }
            for series in &meta.series {
                names.extend(series.names().map(|n| n.to_string()));
            }
        }
        drop(metas);
        models::utils::sort_dedup(&mut names);
        self.index_cache.put(cache_key, names.clone());
        Ok(names)
    }

    pub async fn label_values(&self, label_name: &str, range: TimeRange) -> Result<Vec<String>> {
        let cache_key = format!(
            "{}/values/{}/{}:{}",
            self.user_id, label_name, range.min_ts, range.max_ts
        );
        if let Some(values) = self.index_cache.get(&cache_key) {
            return Ok(values);
        }

        let metas = self.metas.read();
        let mut values = Vec::new();
        for meta in metas.values() {
            if !TimeRange::new(meta.min_time, meta.max_time).overlaps(&range) {
                continue;
            }
            for series in &meta.series {
                if let Some(value) = series.get(label_name) {
                    values.push(value.to_string());
                }
            }
        }
        drop(metas);
        models::utils::sort_dedup(&mut values);
        self.index_cache.put(cache_key, values.clone());
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use models::Matcher;

    use super::*;
    use crate::bucket::{MemObjectStore, ObjectStore, ObjectStoreRef, TenantBucket};
    use crate::meta::META_FILE;

    async fn store_with_blocks(metas: &[BlockMeta]) -> BucketStore {
        let object_store = MemObjectStore::new();
        for meta in metas {
            let name = format!("3/{}/{}", meta.id, META_FILE);
            object_store
                .upload(&name, Bytes::from(serde_json::to_vec(meta).unwrap()))
                .await
                .unwrap();
        }
        let object_store: ObjectStoreRef = Arc::new(object_store);
        let fetcher = MetaFetcher::new(TenantBucket::new("3", object_store), 4, Vec::new());
        let store = BucketStore::new(
            "3",
            fetcher,
            Arc::new(IndexCache::new(64)),
            4,
            1024 * 1024,
        )
        .unwrap();
        store.initial_sync().await.unwrap();
        store
    }

    fn block(id: &str, min_time: i64, max_time: i64, jobs: &[&str]) -> BlockMeta {
        BlockMeta {
            id: id.to_string(),
            min_time,
            max_time,
            series: jobs
                .iter()
                .map(|job| Labels::from_pairs([("__name__", "up"), ("job", *job)]))
                .collect(),
            compaction_sources: Vec::new(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_info_and_sync() {
        let store = store_with_blocks(&[block("b1", 0, 100, &["api"]), block("b2", 50, 200, &["web"])])
            .await;
        assert_eq!(store.info(), (0, 200, 2));
        assert_eq!(store.block_count(), 2);

        // The per-tenant registry carries the catalog gauge.
        let families = store.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "cortex_blocks_loaded"));
    }

    #[tokio::test]
    async fn test_series_matching_and_dedup() {
        let store = store_with_blocks(&[
            block("b1", 0, 100, &["api", "web"]),
            block("b2", 50, 200, &["api"]),
        ])
        .await;

        let all = store
            .series(TimeRange::new(0, 200), &[])
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let api = store
            .series(TimeRange::new(0, 200), &[Matcher::eq("job", "api")])
            .await
            .unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].get("job"), Some("api"));

        // Blocks outside the range contribute nothing.
        let none = store
            .series(TimeRange::new(300, 400), &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_pool_budget() {
        let object_store: ObjectStoreRef = Arc::new(MemObjectStore::new());
        let fetcher = MetaFetcher::new(TenantBucket::new("3", object_store), 4, Vec::new());
        let store =
            BucketStore::new("3", fetcher, Arc::new(IndexCache::new(64)), 4, 8).unwrap();
        *store.metas.write() =
            [("b1".to_string(), block("b1", 0, 100, &["api", "web"]))].into();

        let err = store
            .series(TimeRange::new(0, 100), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ChunkPoolExhausted { .. }));
    }

    #[tokio::test]
    async fn test_label_names_and_values() {
        let store = store_with_blocks(&[block("b1", 0, 100, &["api", "web"])]).await;
        assert_eq!(
            store.label_names(TimeRange::new(0, 100)).await.unwrap(),
            vec!["__name__".to_string(), "job".to_string()]
        );
        assert_eq!(
            store
                .label_values("job", TimeRange::new(0, 100))
                .await
                .unwrap(),
            vec!["api".to_string(), "web".to_string()]
        );
    }
}
