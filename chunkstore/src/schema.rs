use std::fmt::Debug;

use config::{PeriodicTableConfig, SchemaConfig};
use models::utils::bkdr_hash::BkdrHasher;
use models::{Labels, TimeRange, Timestamp, METRIC_NAME_LABEL};

use crate::error::{CommonSnafu, InvalidRangeValueSnafu, Result};
use crate::index::{IndexEntry, IndexQuery};

/// Range-value layout version octets. V1 rows carry only the chunk key, V2
/// rows carry a label value hash, the chunk key and the value payload.
const RANGE_VERSION_CHUNK: u8 = b'1';
const RANGE_VERSION_LABEL_VALUE: u8 = b'2';

/// Metric-name rows of the v10 schema are spread over this many shards.
const V10_METRIC_SHARDS: u64 = 16;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    number: i64,
}

fn buckets(from: Timestamp, through: Timestamp, tables: &PeriodicTableConfig) -> Vec<Bucket> {
    let first = tables.bucket_for(from);
    let last = tables.bucket_for(through);
    (first..=last).map(|number| Bucket { number }).collect()
}

fn join_range_value(parts: &[&[u8]], version: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum::<usize>() + 2);
    for part in parts {
        out.extend_from_slice(part);
        out.push(0);
    }
    out.push(version);
    out.push(0);
    out
}

fn value_hash(value: &str) -> String {
    let mut hasher = BkdrHasher::new();
    hasher.hash_with(value.as_bytes());
    format!("{:016x}", hasher.number())
}

/// Splits a range value back into (chunk key, optional label value). The
/// label value travels in the row's value payload for V2 rows.
pub fn parse_chunk_time_range_value(
    range_value: &[u8],
    value: &[u8],
) -> Result<(String, Option<String>)> {
    let mut components: Vec<&[u8]> = range_value.split(|b| *b == 0).collect();
    // Splitting on the trailing separator leaves one empty component.
    if components.last() == Some(&&b""[..]) {
        components.pop();
    }
    let version = match components.last() {
        Some(v) if v.len() == 1 => v[0],
        _ => return Err(InvalidRangeValueSnafu.build()),
    };

    let utf8 = |buf: &[u8]| -> Result<String> {
        String::from_utf8(buf.to_vec()).map_err(|_| InvalidRangeValueSnafu.build())
    };

    match version {
        RANGE_VERSION_CHUNK if components.len() == 2 => Ok((utf8(components[0])?, None)),
        RANGE_VERSION_LABEL_VALUE if components.len() == 3 => {
            Ok((utf8(components[1])?, Some(utf8(value)?)))
        }
        _ => Err(InvalidRangeValueSnafu.build()),
    }
}

/// A versioned mapping from (user, metric, labels, time) to index rows and
/// from the three supported query shapes to index lookups.
pub trait Schema: Send + Sync + Debug {
    fn write_entries(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        labels: &Labels,
        chunk_id: &str,
    ) -> Result<Vec<IndexEntry>>;

    fn read_queries_for_metric(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
    ) -> Result<Vec<IndexQuery>>;

    fn read_queries_for_metric_label(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        label_name: &str,
    ) -> Result<Vec<IndexQuery>>;

    fn read_queries_for_metric_label_value(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        label_name: &str,
        label_value: &str,
    ) -> Result<Vec<IndexQuery>>;
}

/// The v9/v10 entry layout. v10 additionally spreads hot metric-name rows
/// over `V10_METRIC_SHARDS` partitions keyed by series fingerprint.
#[derive(Debug)]
pub struct EntrySchema {
    tables: PeriodicTableConfig,
    shard_metric_rows: bool,
}

impl EntrySchema {
    pub fn v9(tables: PeriodicTableConfig) -> Self {
        Self {
            tables,
            shard_metric_rows: false,
        }
    }

    pub fn v10(tables: PeriodicTableConfig) -> Self {
        Self {
            tables,
            shard_metric_rows: true,
        }
    }

    fn metric_hash(&self, user_id: &str, bucket: Bucket, metric_name: &str, shard: Option<u64>) -> String {
        match shard {
            Some(s) => format!("{:02}:{}:{}:{}", s, user_id, bucket.number, metric_name),
            None => format!("{}:{}:{}", user_id, bucket.number, metric_name),
        }
    }

    fn label_hash(&self, user_id: &str, bucket: Bucket, metric_name: &str, label_name: &str) -> String {
        format!("{}:{}:{}:{}", user_id, bucket.number, metric_name, label_name)
    }
}

impl Schema for EntrySchema {
    fn write_entries(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        labels: &Labels,
        chunk_id: &str,
    ) -> Result<Vec<IndexEntry>> {
        let fingerprint = labels.fingerprint();
        let shard = self
            .shard_metric_rows
            .then(|| fingerprint % V10_METRIC_SHARDS);

        let mut entries = Vec::new();
        for bucket in buckets(from, through, &self.tables) {
            let table_name = self.tables.table_for_bucket(bucket.number);

            entries.push(IndexEntry {
                table_name: table_name.clone(),
                hash_value: self.metric_hash(user_id, bucket, metric_name, shard),
                range_value: join_range_value(&[chunk_id.as_bytes()], RANGE_VERSION_CHUNK),
                value: Vec::new(),
            });

            for label in labels {
                if label.name == METRIC_NAME_LABEL || label.value.is_empty() {
                    continue;
                }
                entries.push(IndexEntry {
                    table_name: table_name.clone(),
                    hash_value: self.label_hash(user_id, bucket, metric_name, &label.name),
                    range_value: join_range_value(
                        &[value_hash(&label.value).as_bytes(), chunk_id.as_bytes()],
                        RANGE_VERSION_LABEL_VALUE,
                    ),
                    value: label.value.as_bytes().to_vec(),
                });
            }
        }
        Ok(entries)
    }

    fn read_queries_for_metric(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
    ) -> Result<Vec<IndexQuery>> {
        let mut queries = Vec::new();
        for bucket in buckets(from, through, &self.tables) {
            let table_name = self.tables.table_for_bucket(bucket.number);
            if self.shard_metric_rows {
                for shard in 0..V10_METRIC_SHARDS {
                    queries.push(IndexQuery::new(
                        table_name.clone(),
                        self.metric_hash(user_id, bucket, metric_name, Some(shard)),
                    ));
                }
            } else {
                queries.push(IndexQuery::new(
                    table_name,
                    self.metric_hash(user_id, bucket, metric_name, None),
                ));
            }
        }
        Ok(queries)
    }

    fn read_queries_for_metric_label(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        label_name: &str,
    ) -> Result<Vec<IndexQuery>> {
        Ok(buckets(from, through, &self.tables)
            .into_iter()
            .map(|bucket| {
                IndexQuery::new(
                    self.tables.table_for_bucket(bucket.number),
                    self.label_hash(user_id, bucket, metric_name, label_name),
                )
            })
            .collect())
    }

    fn read_queries_for_metric_label_value(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        label_name: &str,
        label_value: &str,
    ) -> Result<Vec<IndexQuery>> {
        let mut prefix = value_hash(label_value).into_bytes();
        prefix.push(0);
        Ok(self
            .read_queries_for_metric_label(from, through, user_id, metric_name, label_name)?
            .into_iter()
            .map(|q| q.with_range_prefix(prefix.clone()))
            .collect())
    }
}

/// Time-aware schema dispatch built from `SchemaConfig`. Operations spanning
/// a schema boundary split the interval at the boundary.
#[derive(Debug)]
pub struct SchemaRegistry {
    entries: Vec<(Timestamp, PeriodicTableConfig, Box<dyn Schema>)>,
}

impl SchemaRegistry {
    pub fn new(config: &SchemaConfig) -> Result<Self> {
        let mut entries: Vec<(Timestamp, PeriodicTableConfig, Box<dyn Schema>)> = Vec::new();
        for cfg in &config.configs {
            let schema: Box<dyn Schema> = match cfg.schema.as_str() {
                "v9" => Box::new(EntrySchema::v9(cfg.index_tables.clone())),
                "v10" => Box::new(EntrySchema::v10(cfg.index_tables.clone())),
                other => {
                    return Err(CommonSnafu {
                        reason: format!("unknown schema version '{}'", other),
                    }
                    .build())
                }
            };
            entries.push((cfg.from, cfg.chunk_tables.clone(), schema));
        }
        entries.sort_by_key(|(from, _, _)| *from);
        if entries.is_empty() {
            return Err(CommonSnafu {
                reason: "schema config has no entries".to_string(),
            }
            .build());
        }
        Ok(Self { entries })
    }

    /// Sub-intervals of [from, through] with the schema active in each.
    fn segments(&self, from: Timestamp, through: Timestamp) -> Vec<(TimeRange, &dyn Schema)> {
        let mut out = Vec::new();
        for (i, (active_from, _, schema)) in self.entries.iter().enumerate() {
            let seg_start = (*active_from).max(from);
            let seg_end = match self.entries.get(i + 1) {
                Some((next_from, _, _)) => through.min(next_from - 1),
                None => through,
            };
            if seg_start <= seg_end {
                out.push((TimeRange::new(seg_start, seg_end), schema.as_ref()));
            }
        }
        out
    }

    /// The chunk-table name for a timestamp, per the active schema entry.
    pub fn chunk_table_for(&self, ts: Timestamp) -> String {
        let mut chosen = &self.entries[0].1;
        for (from, tables, _) in &self.entries {
            if *from <= ts {
                chosen = tables;
            }
        }
        chosen.table_for(ts)
    }

    pub fn write_entries(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        labels: &Labels,
        chunk_id: &str,
    ) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        for (range, schema) in self.segments(from, through) {
            entries.extend(schema.write_entries(
                range.min_ts,
                range.max_ts,
                user_id,
                metric_name,
                labels,
                chunk_id,
            )?);
        }
        Ok(entries)
    }

    pub fn read_queries_for_metric(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
    ) -> Result<Vec<IndexQuery>> {
        let mut queries = Vec::new();
        for (range, schema) in self.segments(from, through) {
            queries.extend(schema.read_queries_for_metric(
                range.min_ts,
                range.max_ts,
                user_id,
                metric_name,
            )?);
        }
        Ok(queries)
    }

    pub fn read_queries_for_metric_label(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        label_name: &str,
    ) -> Result<Vec<IndexQuery>> {
        let mut queries = Vec::new();
        for (range, schema) in self.segments(from, through) {
            queries.extend(schema.read_queries_for_metric_label(
                range.min_ts,
                range.max_ts,
                user_id,
                metric_name,
                label_name,
            )?);
        }
        Ok(queries)
    }

    pub fn read_queries_for_metric_label_value(
        &self,
        from: Timestamp,
        through: Timestamp,
        user_id: &str,
        metric_name: &str,
        label_name: &str,
        label_value: &str,
    ) -> Result<Vec<IndexQuery>> {
        let mut queries = Vec::new();
        for (range, schema) in self.segments(from, through) {
            queries.extend(schema.read_queries_for_metric_label_value(
                range.min_ts,
                range.max_ts,
                user_id,
                metric_name,
                label_name,
                label_value,
            )?);
        }
        Ok(queries)
    }
}
