use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use config::{LimitsConfig, SchemaConfig, StoreConfig};
use models::utils::{intersect_sorted, sort_dedup};
use models::{extract_metric_name, Labels, MatchType, Matcher, TimeRange, Timestamp};
use parking_lot::Mutex;
use snafu::ensure;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheRef, MemCache};
use crate::chunk::Chunk;
use crate::client::ChunkClientRef;
use crate::error::{
    CommonSnafu, InvalidQueryRangeSnafu, MetricNameLabelMissingSnafu, QueryTooLongSnafu,
    Result, TooManyChunksSnafu, UnimplementedSnafu,
};
use crate::fetcher::ChunkFetcher;
use crate::index::{IndexClient, IndexClientRef, IndexEntry, IndexQuery, ReadBatch, WriteBatch};
use crate::metrics::INDEX_ENTRIES_PER_CHUNK;
use crate::schema::{parse_chunk_time_range_value, SchemaRegistry};

/// Tolerated clock skew before a query's end is clamped back to now.
const FUTURE_TOLERANCE_MS: i64 = 5 * 60 * 1000;

/// Per-tenant query limits.
pub trait StoreLimits: Send + Sync + Debug {
    /// Longest allowed query interval in ms, 0 for unlimited.
    fn max_query_length(&self, user_id: &str) -> i64;
    /// Most chunks one query may touch, 0 for unlimited.
    fn max_chunks_per_query(&self, user_id: &str) -> usize;
}

impl StoreLimits for LimitsConfig {
    fn max_query_length(&self, _user_id: &str) -> i64 {
        self.max_query_length
    }

    fn max_chunks_per_query(&self, _user_id: &str) -> usize {
        self.max_chunks_per_query
    }
}

fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub type ScanPageCallback = Arc<dyn Fn(&dyn ReadBatch) + Send + Sync>;

/// The chunk store: index-entry planning, cache-fronted chunk IO and the
/// matcher-driven query pipeline. Owns its index client, chunk client,
/// schema registry and fetcher.
#[derive(Debug)]
pub struct ChunkStore {
    config: StoreConfig,
    index: IndexClientRef,
    chunks: ChunkClientRef,
    schema: Arc<SchemaRegistry>,
    limits: Arc<dyn StoreLimits>,
    fetcher: ChunkFetcher,
    write_dedupe: Option<CacheRef>,
}

impl ChunkStore {
    pub fn new(
        config: StoreConfig,
        schema_config: &SchemaConfig,
        index: IndexClientRef,
        chunks: ChunkClientRef,
        limits: Arc<dyn StoreLimits>,
    ) -> Result<Self> {
        let chunk_cache: CacheRef = Arc::new(MemCache::new(&config.chunk_cache));
        let fetcher = ChunkFetcher::new(chunk_cache, config.chunk_cache_stubs, chunks.clone());
        let write_dedupe: Option<CacheRef> = config
            .write_dedupe_cache
            .enabled
            .then(|| Arc::new(MemCache::new(&config.write_dedupe_cache)) as CacheRef);

        Ok(Self {
            config,
            index,
            chunks,
            schema: Arc::new(SchemaRegistry::new(schema_config)?),
            limits,
            fetcher,
            write_dedupe,
        })
    }

    /// Halts background cache workers.
    pub fn stop(&self) {
        self.fetcher.stop();
        if let Some(cache) = &self.write_dedupe {
            cache.stop();
        }
    }

    pub fn fetcher(&self) -> &ChunkFetcher {
        &self.fetcher
    }

    // ---- write path ----

    pub async fn put(&self, chunks: Vec<Chunk>) -> Result<()> {
        for chunk in chunks {
            let (from, through) = (chunk.from(), chunk.through());
            self.put_one(from, through, chunk).await?;
        }
        Ok(())
    }

    /// Payload write happens-before index write, so a reader that discovers
    /// the chunk through the index can always fetch it. The write is not
    /// atomic; partial state is tolerable because entries are idempotent by
    /// key.
    pub async fn put_one(
        &self,
        from: Timestamp,
        through: Timestamp,
        mut chunk: Chunk,
    ) -> Result<()> {
        if chunk.encoded_bytes().is_err() {
            chunk.encode()?;
        }

        self.chunks.put_chunks(std::slice::from_ref(&chunk)).await?;

        if let Err(e) = self.fetcher.write_back_cache(std::slice::from_ref(&chunk)) {
            warn!("could not store chunks in chunk cache, err: {}", e);
        }

        let batch = self.calculate_index_entries(from, through, &chunk)?;
        self.write_index_batch(batch, through).await
    }

    /// Index-only write path, used when reindexing existing chunks into a
    /// new table family.
    pub async fn index_chunk(&self, chunk: Chunk) -> Result<()> {
        let (from, through) = (chunk.from(), chunk.through());
        let batch = self.calculate_index_entries(from, through, &chunk)?;
        self.write_index_batch(batch, through).await
    }

    /// Entries for every supported query shape, deduped on the
    /// (table, hash, range) triple.
    fn calculate_index_entries(
        &self,
        from: Timestamp,
        through: Timestamp,
        chunk: &Chunk,
    ) -> Result<WriteBatch> {
        let metric_name = chunk
            .metric
            .metric_name()
            .ok_or_else(|| MetricNameLabelMissingSnafu.build())?;

        let entries = self.schema.write_entries(
            from,
            through,
            &chunk.user_id,
            metric_name,
            &chunk.metric,
            &chunk.external_key(),
        )?;
        INDEX_ENTRIES_PER_CHUNK.observe(entries.len() as f64);

        let mut seen = HashSet::with_capacity(entries.len());
        let mut batch = self.index.new_write_batch();
        for entry in entries {
            if seen.insert(entry_key(&entry)) {
                batch.add_entry(entry);
            }
        }
        Ok(batch)
    }

    /// Runs the batch through the write-dedupe cache before hitting the
    /// index: keys seen recently are suppressed, survivors are recorded
    /// after a successful write.
    async fn write_index_batch(&self, batch: WriteBatch, chunk_end: Timestamp) -> Result<()> {
        let cache = match &self.write_dedupe {
            Some(cache) if self.dedupe_eligible(chunk_end) => cache,
            _ => return self.index.batch_write(batch).await,
        };

        let keys: Vec<String> = batch.adds.iter().map(entry_key).collect();
        let (found, _) = cache.fetch(&keys).await;
        let found: HashSet<String> = found.into_iter().map(|(k, _)| k).collect();

        let mut filtered = self.index.new_write_batch();
        let mut written_keys = Vec::new();
        for entry in batch.adds {
            let key = entry_key(&entry);
            if !found.contains(&key) {
                written_keys.push(key);
                filtered.add_entry(entry);
            }
        }
        for (table, hash, range) in batch.deletes {
            filtered.delete(table, hash, range);
        }
        if filtered.is_empty() {
            return Ok(());
        }
        self.index.batch_write(filtered).await?;

        // Only record keys once the write is known to have landed.
        for key in written_keys {
            let _ = cache
                .store(&key, bytes::Bytes::from_static(b"\x01"))
                .await;
        }
        Ok(())
    }

    fn dedupe_eligible(&self, chunk_end: Timestamp) -> bool {
        let threshold = self.config.cache_lookups_older_than;
        threshold == 0 || chunk_end < now_ms() - threshold
    }

    // ---- validation ----

    /// Bounds checks and clamps. Returns true when the query degenerates to
    /// an empty result.
    fn validate_query_time_range(
        &self,
        user_id: &str,
        from: &mut Timestamp,
        through: &mut Timestamp,
    ) -> Result<bool> {
        ensure!(
            *through >= *from,
            InvalidQueryRangeSnafu {
                from: *from,
                through: *through
            }
        );

        let max_query_length = self.limits.max_query_length(user_id);
        if max_query_length > 0 && *through - *from > max_query_length {
            return QueryTooLongSnafu {
                length: *through - *from,
                limit: max_query_length,
            }
            .fail();
        }

        let now = now_ms();

        if *from > now {
            // Whole time span in the future, yield an empty result set.
            info!(
                "whole timerange in future, yield empty resultset, from: {}, through: {}, now: {}",
                from, through, now
            );
            return Ok(true);
        }

        if self.config.max_look_back_period > 0 {
            let oldest_start_time = now - self.config.max_look_back_period;
            if oldest_start_time > *from {
                *from = oldest_start_time;
            }
        }

        if *through > now + FUTURE_TOLERANCE_MS {
            // Avoid processing the future part, some schemas would trip on
            // tables that do not exist yet.
            info!(
                "adjusting end timerange from future to now, old_through: {}, new_through: {}",
                through, now
            );
            *through = now;
        }

        Ok(false)
    }

    /// Time-range validation plus extraction of the mandatory metric-name
    /// equality matcher. `None` means the empty-result shortcut applies.
    fn validate_query(
        &self,
        user_id: &str,
        from: &mut Timestamp,
        through: &mut Timestamp,
        matchers: Vec<Matcher>,
    ) -> Result<Option<(String, Vec<Matcher>)>> {
        if self.validate_query_time_range(user_id, from, through)? {
            return Ok(None);
        }

        let (metric_name, matchers) = extract_metric_name(matchers)
            .ok_or_else(|| crate::error::QueryMustContainMetricNameSnafu.build())?;

        Ok(Some((metric_name, matchers)))
    }

    // ---- read path ----

    pub async fn get(
        &self,
        user_id: &str,
        from: Timestamp,
        through: Timestamp,
        matchers: Vec<Matcher>,
    ) -> Result<Vec<Chunk>> {
        let (mut from, mut through) = (from, through);
        debug!(
            "chunk store get, from: {}, through: {}, matchers: {}",
            from,
            through,
            matchers.len()
        );

        let (metric_name, matchers) =
            match self.validate_query(user_id, &mut from, &mut through, matchers)? {
                Some(validated) => validated,
                None => return Ok(Vec::new()),
            };

        self.get_metric_name_chunks(user_id, from, through, matchers, &metric_name)
            .await
    }

    pub async fn get_chunk_refs(
        &self,
        _user_id: &str,
        _from: Timestamp,
        _through: Timestamp,
        _matchers: Vec<Matcher>,
    ) -> Result<Vec<Vec<Chunk>>> {
        UnimplementedSnafu {
            msg: "not implemented".to_string(),
        }
        .fail()
    }

    /// Series ids only exist in the series store; nothing to do here.
    pub async fn delete_series_ids(
        &self,
        _from: Timestamp,
        _through: Timestamp,
        _user_id: &str,
        _metric: &Labels,
    ) -> Result<()> {
        Ok(())
    }

    async fn get_metric_name_chunks(
        &self,
        user_id: &str,
        from: Timestamp,
        through: Timestamp,
        all_matchers: Vec<Matcher>,
        metric_name: &str,
    ) -> Result<Vec<Chunk>> {
        let (filters, matchers) = split_filters_and_matchers(all_matchers);
        let chunks = self
            .lookup_chunks_by_metric_name(user_id, from, through, matchers, metric_name)
            .await?;
        debug!("chunks in index: {}", chunks.len());

        // Filter out chunks that are not in the selected time range.
        let filtered = filter_chunks_by_time(from, through, chunks);
        debug!("chunks post filtering: {}", filtered.len());

        let max_chunks = self.limits.max_chunks_per_query(user_id);
        if max_chunks > 0 && filtered.len() > max_chunks {
            return TooManyChunksSnafu {
                fetched: filtered.len(),
                limit: max_chunks,
            }
            .fail();
        }

        let keys = keys_from_chunks(&filtered);
        let all_chunks = self.fetcher.fetch_chunks(filtered, keys).await?;

        // Drop chunks the empty-matching predicates rule out.
        Ok(filter_chunks_by_matchers(all_chunks, &filters))
    }

    async fn lookup_chunks_by_metric_name(
        &self,
        user_id: &str,
        from: Timestamp,
        through: Timestamp,
        matchers: Vec<Matcher>,
        metric_name: &str,
    ) -> Result<Vec<Chunk>> {
        // Just get chunks for the metric when there are no matchers.
        if matchers.is_empty() {
            let queries = self
                .schema
                .read_queries_for_metric(from, through, user_id, metric_name)?;
            let entries = lookup_entries_by_queries(self.index.as_ref(), &queries).await?;
            let chunk_ids = parse_index_entries(&entries, None)?;
            return convert_chunk_ids_to_chunks(user_id, &chunk_ids);
        }

        // One lookup task per matcher, multiplexed over a chunk-id channel
        // and an error channel. The coordinator collects exactly N messages.
        let n = matchers.len();
        let (ids_tx, mut ids_rx) = mpsc::channel::<Vec<String>>(n);
        let (err_tx, mut err_rx) = mpsc::channel::<crate::Error>(n);

        for matcher in matchers {
            let index = self.index.clone();
            let schema = self.schema.clone();
            let user = user_id.to_string();
            let metric = metric_name.to_string();
            let ids_tx = ids_tx.clone();
            let err_tx = err_tx.clone();

            tokio::spawn(async move {
                let result = async {
                    let queries = if matcher.match_type != MatchType::Equal {
                        schema.read_queries_for_metric_label(
                            from,
                            through,
                            &user,
                            &metric,
                            &matcher.name,
                        )?
                    } else {
                        schema.read_queries_for_metric_label_value(
                            from,
                            through,
                            &user,
                            &metric,
                            &matcher.name,
                            &matcher.value,
                        )?
                    };
                    debug!("matcher: {}, queries: {}", matcher, queries.len());

                    let entries = lookup_entries_by_queries(index.as_ref(), &queries).await?;
                    debug!("matcher: {}, entries: {}", matcher, entries.len());

                    parse_index_entries(&entries, Some(&matcher))
                }
                .await;

                match result {
                    Ok(ids) => {
                        let _ = ids_tx.send(ids).await;
                    }
                    Err(e) => {
                        let _ = err_tx.send(e).await;
                    }
                }
            });
        }
        drop(ids_tx);
        drop(err_tx);

        let mut chunk_ids: Option<Vec<String>> = None;
        let mut last_err: Option<crate::Error> = None;
        for _ in 0..n {
            tokio::select! {
                Some(incoming) = ids_rx.recv() => {
                    chunk_ids = Some(match chunk_ids {
                        None => incoming,
                        Some(current) => intersect_sorted(current, incoming),
                    });
                }
                Some(e) = err_rx.recv() => {
                    last_err = Some(e);
                }
                else => break,
            }
        }
        if let Some(e) = last_err {
            return Err(e);
        }
        let chunk_ids = chunk_ids.unwrap_or_default();
        debug!("post intersection chunk ids: {}", chunk_ids.len());

        convert_chunk_ids_to_chunks(user_id, &chunk_ids)
    }

    // ---- label discovery ----

    /// All values one label takes within the time range for a metric,
    /// decoded straight from the index rows.
    pub async fn label_values_for_metric_name(
        &self,
        user_id: &str,
        from: Timestamp,
        through: Timestamp,
        metric_name: &str,
        label_name: &str,
    ) -> Result<Vec<String>> {
        let (mut from, mut through) = (from, through);
        if self.validate_query_time_range(user_id, &mut from, &mut through)? {
            return Ok(Vec::new());
        }

        let queries = self.schema.read_queries_for_metric_label(
            from,
            through,
            user_id,
            metric_name,
            label_name,
        )?;
        let entries = lookup_entries_by_queries(self.index.as_ref(), &queries).await?;

        let mut values = Vec::with_capacity(entries.len());
        for entry in &entries {
            let (_, label_value) = parse_chunk_time_range_value(&entry.range_value, &entry.value)?;
            if let Some(value) = label_value {
                values.push(value);
            }
        }
        sort_dedup(&mut values);
        Ok(values)
    }

    /// All label names carried by the metric's chunks within the range. One
    /// chunk per fingerprint is fetched to keep the work bounded.
    pub async fn label_names_for_metric_name(
        &self,
        user_id: &str,
        from: Timestamp,
        through: Timestamp,
        metric_name: &str,
    ) -> Result<Vec<String>> {
        let (mut from, mut through) = (from, through);
        if self.validate_query_time_range(user_id, &mut from, &mut through)? {
            return Ok(Vec::new());
        }

        let chunks = self
            .lookup_chunks_by_metric_name(user_id, from, through, Vec::new(), metric_name)
            .await?;
        debug!("chunks in index: {}", chunks.len());

        let filtered = filter_chunks_by_time(from, through, chunks);
        let unique = filter_chunks_by_unique_fingerprint(filtered);
        debug!("chunks post filtering: {}", unique.len());

        let keys = keys_from_chunks(&unique);
        let fetched = self.fetcher.fetch_chunks(unique, keys).await?;
        Ok(label_names_from_chunks(&fetched))
    }

    // ---- delete ----

    /// Removes a chunk from index and storage. With a partial interval, the
    /// surviving head and tail are re-encoded and written back through the
    /// regular write path first.
    pub async fn delete_chunk(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        chunk_id: &str,
        metric: &Labels,
        partially_deleted_interval: Option<TimeRange>,
    ) -> Result<()> {
        let metric_name = metric
            .metric_name()
            .ok_or_else(|| MetricNameLabelMissingSnafu.build())?;

        let chunk_write_entries =
            self.schema
                .write_entries(from, through, user_id, metric_name, metric, chunk_id)?;

        if let Some(partial) = partially_deleted_interval {
            self.rebound_chunk(user_id, chunk_id, partial).await?;
        }

        let mut batch = self.index.new_write_batch();
        for entry in chunk_write_entries {
            batch.delete(entry.table_name, entry.hash_value, entry.range_value);
        }
        self.index.batch_write(batch).await?;

        match self.chunks.delete_chunk(chunk_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn rebound_chunk(
        &self,
        user_id: &str,
        chunk_id: &str,
        partially_deleted_interval: TimeRange,
    ) -> Result<()> {
        let chunk = Chunk::parse_external_key(user_id, chunk_id)?;
        ensure!(
            chunk.time_range.overlaps(&partially_deleted_interval),
            crate::error::PartialDeleteNoOverlapSnafu
        );

        let fetched = match self
            .fetcher
            .fetch_chunks(vec![chunk.clone()], vec![chunk_id.to_string()])
            .await
        {
            Ok(fetched) => fetched,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if fetched.len() != 1 {
            return CommonSnafu {
                reason: format!("expected to get 1 chunk from storage got {}", fetched.len()),
            }
            .fail();
        }
        let chunk = &fetched[0];

        let mut new_chunks = Vec::new();
        if partially_deleted_interval.min_ts > chunk.from() {
            let head = TimeRange::new(chunk.from(), partially_deleted_interval.min_ts - 1);
            match chunk.slice(head) {
                Ok(sliced) => new_chunks.push(sliced),
                Err(crate::Error::NoDataInSliceRange) => {}
                Err(e) => return Err(e),
            }
        }
        if partially_deleted_interval.max_ts < chunk.through() {
            let tail = TimeRange::new(partially_deleted_interval.max_ts + 1, chunk.through());
            match chunk.slice(tail) {
                Ok(sliced) => new_chunks.push(sliced),
                Err(crate::Error::NoDataInSliceRange) => {}
                Err(e) => return Err(e),
            }
        }

        for mut new_chunk in new_chunks {
            new_chunk.encode()?;
            let (from, through) = (new_chunk.from(), new_chunk.through());
            self.put_one(from, through, new_chunk).await?;
        }
        Ok(())
    }

    // ---- scan ----

    /// Parallel scan over the weekly chunk table, one segment per callback.
    /// Segment handlers are concurrent; each callback only ever runs from
    /// its own segment task.
    pub async fn scan(
        &self,
        from: Timestamp,
        _through: Timestamp,
        reindex: bool,
        callbacks: Vec<ScanPageCallback>,
    ) -> Result<()> {
        let table_name = self.schema.chunk_table_for(from);
        let total_segments = callbacks.len();
        info!(
            "scanning table {} in {} segments, reindex: {}",
            table_name, total_segments, reindex
        );

        let mut handles = Vec::with_capacity(total_segments);
        for (segment, callback) in callbacks.into_iter().enumerate() {
            let index = self.index.clone();
            let table_name = table_name.clone();
            handles.push(tokio::spawn(async move {
                index
                    .scan_table(&table_name, segment, total_segments, &|_query, page| {
                        callback(page);
                        true
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.map_err(|e| {
                CommonSnafu {
                    reason: format!("scan segment task failed: {}", e),
                }
                .build()
            })??;
        }
        Ok(())
    }
}

fn entry_key(entry: &IndexEntry) -> String {
    let mut key = String::with_capacity(
        entry.table_name.len() + entry.hash_value.len() + entry.range_value.len() * 2 + 2,
    );
    key.push_str(&entry.table_name);
    key.push(':');
    key.push_str(&entry.hash_value);
    key.push(':');
    for b in &entry.range_value {
        key.push_str(&format!("{:02x}", b));
    }
    key
}

async fn lookup_entries_by_queries(
    index: &dyn IndexClient,
    queries: &[IndexQuery],
) -> Result<Vec<IndexEntry>> {
    let entries = Mutex::new(Vec::new());
    index
        .query_pages(queries, &|query, page| {
            let mut guard = entries.lock();
            for row in page.rows() {
                guard.push(IndexEntry {
                    table_name: query.table_name.clone(),
                    hash_value: query.hash_value.clone(),
                    range_value: row.range_value.clone(),
                    value: row.value.clone(),
                });
            }
            true
        })
        .await?;
    Ok(entries.into_inner())
}

/// Index entries to sorted, deduped chunk ids, dropping rows whose label
/// value fails the matcher.
fn parse_index_entries(entries: &[IndexEntry], matcher: Option<&Matcher>) -> Result<Vec<String>> {
    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        let (chunk_key, label_value) =
            parse_chunk_time_range_value(&entry.range_value, &entry.value)?;
        if let Some(matcher) = matcher {
            if !matcher.matches(label_value.as_deref().unwrap_or("")) {
                continue;
            }
        }
        result.push(chunk_key);
    }
    // Sorted and deduped because these sets get merged with other sets.
    sort_dedup(&mut result);
    Ok(result)
}

fn convert_chunk_ids_to_chunks(user_id: &str, chunk_ids: &[String]) -> Result<Vec<Chunk>> {
    chunk_ids
        .iter()
        .map(|id| Chunk::parse_external_key(user_id, id))
        .collect()
}

/// Matchers that accept the empty string cannot be answered from the index
/// and run as post-filters instead.
fn split_filters_and_matchers(all_matchers: Vec<Matcher>) -> (Vec<Matcher>, Vec<Matcher>) {
    let mut filters = Vec::new();
    let mut matchers = Vec::new();
    for matcher in all_matchers {
        if matcher.matches_empty() {
            filters.push(matcher);
        } else {
            matchers.push(matcher);
        }
    }
    (filters, matchers)
}

fn filter_chunks_by_time(from: Timestamp, through: Timestamp, chunks: Vec<Chunk>) -> Vec<Chunk> {
    let range = TimeRange::new(from, through);
    chunks
        .into_iter()
        .filter(|c| c.time_range.overlaps(&range))
        .collect()
}

fn filter_chunks_by_matchers(chunks: Vec<Chunk>, filters: &[Matcher]) -> Vec<Chunk> {
    chunks
        .into_iter()
        .filter(|chunk| {
            filters
                .iter()
                .all(|f| f.matches(chunk.metric.get(&f.name).unwrap_or("")))
        })
        .collect()
}

/// Keeps the first chunk per fingerprint. Used before fetching when only the
/// label sets matter.
fn filter_chunks_by_unique_fingerprint(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::with_capacity(chunks.len());
    chunks
        .into_iter()
        .filter(|c| seen.insert(c.fingerprint))
        .collect()
}

fn keys_from_chunks(chunks: &[Chunk]) -> Vec<String> {
    chunks.iter().map(|c| c.external_key()).collect()
}

fn label_names_from_chunks(chunks: &[Chunk]) -> Vec<String> {
    let mut names = Vec::new();
    for chunk in chunks {
        for name in chunk.metric.names() {
            names.push(name.to_string());
        }
    }
    sort_dedup(&mut names);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filters_and_matchers() {
        let all = vec![
            Matcher::eq("job", "api"),
            Matcher::new(MatchType::NotEqual, "env", "prod").unwrap(),
            Matcher::new(MatchType::Regex, "instance", "i-.+").unwrap(),
        ];
        let (filters, matchers) = split_filters_and_matchers(all);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name, "env");
        assert_eq!(matchers.len(), 2);
    }

    #[test]
    fn test_filter_chunks_by_unique_fingerprint() {
        let labels = Labels::from_pairs([("__name__", "up"), ("job", "api")]);
        let data = crate::chunk::ChunkData::new(vec![crate::chunk::Sample::new(1, 1.0)]);
        let a = Chunk::new("7", labels.clone(), data.clone()).unwrap();
        let b = Chunk::new("7", labels, data).unwrap();
        assert_eq!(filter_chunks_by_unique_fingerprint(vec![a, b]).len(), 1);
    }

    #[test]
    fn test_entry_key_distinguishes_ranges() {
        let mut a = IndexEntry {
            table_name: "t".to_string(),
            hash_value: "h".to_string(),
            range_value: vec![1, 2],
            value: Vec::new(),
        };
        let b = a.clone();
        assert_eq!(entry_key(&a), entry_key(&b));
        a.range_value = vec![1, 3];
        assert_ne!(entry_key(&a), entry_key(&b));
    }
}
