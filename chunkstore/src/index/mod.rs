use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use mem::MemIndexClient;

mod mem;

pub type IndexClientRef = Arc<dyn IndexClient>;

/// One ranged lookup against a single table partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub table_name: String,
    pub hash_value: String,
    /// Restricts matches to range values starting with this prefix.
    pub range_prefix: Option<Vec<u8>>,
    /// Restricts matches to rows carrying exactly this value payload.
    pub value_equal: Option<Vec<u8>>,
}

impl IndexQuery {
    pub fn new(table_name: impl Into<String>, hash_value: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            hash_value: hash_value.into(),
            range_prefix: None,
            value_equal: None,
        }
    }

    pub fn with_range_prefix(mut self, prefix: Vec<u8>) -> Self {
        self.range_prefix = Some(prefix);
        self
    }
}

/// One row of the secondary index. The triple (table, hash, range) uniquely
/// identifies an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub table_name: String,
    pub hash_value: String,
    pub range_value: Vec<u8>,
    pub value: Vec<u8>,
}

/// Ordered accumulator of index mutations. Applied atomically per table only
/// to the extent the backing store supports it.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub(crate) adds: Vec<IndexEntry>,
    pub(crate) deletes: Vec<(String, String, Vec<u8>)>,
}

impl WriteBatch {
    pub fn add(
        &mut self,
        table_name: impl Into<String>,
        hash_value: impl Into<String>,
        range_value: Vec<u8>,
        value: Vec<u8>,
    ) {
        self.adds.push(IndexEntry {
            table_name: table_name.into(),
            hash_value: hash_value.into(),
            range_value,
            value,
        });
    }

    pub fn add_entry(&mut self, entry: IndexEntry) {
        self.adds.push(entry);
    }

    pub fn delete(
        &mut self,
        table_name: impl Into<String>,
        hash_value: impl Into<String>,
        range_value: Vec<u8>,
    ) {
        self.deletes
            .push((table_name.into(), hash_value.into(), range_value));
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adds.len() + self.deletes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub hash_value: String,
    pub range_value: Vec<u8>,
    pub value: Vec<u8>,
}

/// One page of rows returned by a paginated query. Callers consume a page
/// fully before the next arrives.
pub trait ReadBatch: Send + Sync {
    fn rows(&self) -> &[IndexRow];
}

#[derive(Debug, Default, Clone)]
pub struct RowPage {
    pub rows: Vec<IndexRow>,
}

impl ReadBatch for RowPage {
    fn rows(&self) -> &[IndexRow] {
        &self.rows
    }
}

/// Invoked once per page. Returning false stops pagination for that query.
/// Implementations may fan queries out internally and invoke the callback
/// concurrently; callers synchronize.
pub type PageCallback<'a> = &'a (dyn Fn(&IndexQuery, &dyn ReadBatch) -> bool + Send + Sync);

/// Abstract paginated KV index.
#[async_trait]
pub trait IndexClient: Send + Sync + Debug {
    fn new_write_batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    async fn batch_write(&self, batch: WriteBatch) -> Result<()>;

    async fn query_pages(&self, queries: &[IndexQuery], callback: PageCallback<'_>) -> Result<()>;

    /// Sequentially reads one segment of a full-table parallel scan,
    /// invoking the callback per page.
    async fn scan_table(
        &self,
        table_name: &str,
        segment: usize,
        total_segments: usize,
        callback: PageCallback<'_>,
    ) -> Result<()>;
}
