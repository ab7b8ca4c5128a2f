use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::stream::{self, StreamExt};
use models::{Labels, Timestamp};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::bucket::TenantBucket;
use crate::error::{ParseBlockMetaSnafu, Result};

pub const META_FILE: &str = "meta.json";

/// Catalog entry for one TSDB block: its interval, the series it holds and
/// the source blocks it was compacted from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockMeta {
    pub id: String,
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    #[serde(default)]
    pub series: Vec<Labels>,
    #[serde(default)]
    pub compaction_sources: Vec<String>,
    /// Upload time, unix milliseconds.
    #[serde(default)]
    pub created_at: Timestamp,
}

/// Applied to the fetched meta set before it becomes the catalog. Order
/// matters: consistency delay runs before deduplication.
pub trait MetaFilter: Send + Sync + Debug {
    fn filter(&self, metas: &mut HashMap<String, BlockMeta>);
}

/// Hides blocks uploaded too recently for object-store listings to be
/// trusted.
#[derive(Debug)]
pub struct ConsistencyDelayMetaFilter {
    delay_ms: i64,
}

impl ConsistencyDelayMetaFilter {
    pub fn new(delay_ms: i64) -> Self {
        Self { delay_ms }
    }
}

impl MetaFilter for ConsistencyDelayMetaFilter {
    fn filter(&self, metas: &mut HashMap<String, BlockMeta>) {
        if self.delay_ms <= 0 {
            return;
        }
        let cutoff = now_ms() - self.delay_ms;
        metas.retain(|id, meta| {
            let keep = meta.created_at <= cutoff;
            if !keep {
                debug!("hiding block {} within consistency delay", id);
            }
            keep
        });
    }
}

/// Drops blocks fully covered by another block's compaction sources, the
/// leftovers of compactions whose inputs are still listed.
#[derive(Debug, Default)]
pub struct DeduplicateFilter;

impl MetaFilter for DeduplicateFilter {
    fn filter(&self, metas: &mut HashMap<String, BlockMeta>) {
        let mut superseded: HashSet<String> = HashSet::new();
        for meta in metas.values() {
            for source in &meta.compaction_sources {
                if source != &meta.id {
                    superseded.insert(source.clone());
                }
            }
        }
        metas.retain(|id, _| !superseded.contains(id));
    }
}

/// Lists and parses every block meta under one tenant prefix with bounded
/// fetch concurrency, then runs the filters in order.
#[derive(Debug)]
pub struct MetaFetcher {
    bucket: TenantBucket,
    concurrency: usize,
    filters: Vec<Box<dyn MetaFilter>>,
}

impl MetaFetcher {
    pub fn new(bucket: TenantBucket, concurrency: usize, filters: Vec<Box<dyn MetaFilter>>) -> Self {
        Self {
            bucket,
            concurrency: concurrency.max(1),
            filters,
        }
    }

    pub async fn fetch(&self) -> Result<HashMap<String, BlockMeta>> {
        let block_dirs = self.bucket.iter("").await?;

        let fetched: Vec<Option<(String, BlockMeta)>> = stream::iter(block_dirs)
            .map(|dir| async move {
                let block_id = dir.trim_end_matches('/').to_string();
                match self.fetch_one(&block_id).await {
                    Ok(meta) => Some((block_id, meta)),
                    Err(e) if e.is_not_found() => {
                        // Partial upload or deletion in progress.
                        debug!("block {} has no {}", block_id, META_FILE);
                        None
                    }
                    Err(e) => {
                        warn!("failed to fetch meta for block {}: {}", block_id, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut metas: HashMap<String, BlockMeta> = fetched.into_iter().flatten().collect();
        for filter in &self.filters {
            filter.filter(&mut metas);
        }
        Ok(metas)
    }

    async fn fetch_one(&self, block_id: &str) -> Result<BlockMeta> {
        let name = format!("{}/{}", block_id, META_FILE);
        let payload = self.bucket.get(&name).await?;
        serde_json::from_slice(&payload).context(ParseBlockMetaSnafu { name })
    }
}

pub(crate) fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
