use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::index::{IndexClient, IndexQuery, IndexRow, PageCallback, RowPage, WriteBatch};

const PAGE_SIZE: usize = 100;

type Table = BTreeMap<(String, Vec<u8>), Vec<u8>>;

/// BTreeMap-backed index client. The reference implementation for tests and
/// at-rest scans; real deployments inject a driver-backed client.
#[derive(Debug, Default)]
pub struct MemIndexClient {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl MemIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table_name: &str) -> usize {
        self.tables
            .read()
            .get(table_name)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    fn matching_rows(&self, query: &IndexQuery) -> Vec<IndexRow> {
        let tables = self.tables.read();
        let table = match tables.get(&query.table_name) {
            Some(t) => t,
            None => return Vec::new(),
        };

        let mut rows = Vec::new();
        for ((hash, range), value) in table.range((query.hash_value.clone(), Vec::new())..) {
            if hash != &query.hash_value {
                break;
            }
            if let Some(prefix) = &query.range_prefix {
                if !range.starts_with(prefix) {
                    continue;
                }
            }
            if let Some(expected) = &query.value_equal {
                if value != expected {
                    continue;
                }
            }
            rows.push(IndexRow {
                hash_value: hash.clone(),
                range_value: range.clone(),
                value: value.clone(),
            });
        }
        rows
    }
}

#[async_trait]
impl IndexClient for MemIndexClient {
    async fn batch_write(&self, batch: WriteBatch) -> Result<()> {
        let mut tables = self.tables.write();
        for entry in batch.adds {
            tables
                .entry(entry.table_name)
                .or_default()
                .insert((entry.hash_value, entry.range_value), entry.value);
        }
        for (table, hash, range) in batch.deletes {
            if let Some(t) = tables.get_mut(&table) {
                t.remove(&(hash, range));
            }
        }
        Ok(())
    }

    async fn query_pages(&self, queries: &[IndexQuery], callback: PageCallback<'_>) -> Result<()> {
        for query in queries {
            let rows = self.matching_rows(query);
            for page in rows.chunks(PAGE_SIZE.max(1)) {
                let batch = RowPage {
                    rows: page.to_vec(),
                };
                if !callback(query, &batch) {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn scan_table(
        &self,
        table_name: &str,
        segment: usize,
        total_segments: usize,
        callback: PageCallback<'_>,
    ) -> Result<()> {
        let rows: Vec<IndexRow> = {
            let tables = self.tables.read();
            match tables.get(table_name) {
                Some(t) => t
                    .iter()
                    .map(|((hash, range), value)| IndexRow {
                        hash_value: hash.clone(),
                        range_value: range.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        // Contiguous key-space partitioning, the shape of a parallel scan.
        let total = total_segments.max(1);
        let start = segment * rows.len() / total;
        let end = (segment + 1) * rows.len() / total;
        let query = IndexQuery::new(table_name, "");

        for page in rows[start..end].chunks(PAGE_SIZE.max(1)) {
            let batch = RowPage {
                rows: page.to_vec(),
            };
            if !callback(&query, &batch) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::index::ReadBatch;

    fn entry(hash: &str, range: &[u8], value: &[u8]) -> (String, Vec<u8>, Vec<u8>) {
        (hash.to_string(), range.to_vec(), value.to_vec())
    }

    async fn seed(client: &MemIndexClient, table: &str, rows: &[(String, Vec<u8>, Vec<u8>)]) {
        let mut batch = client.new_write_batch();
        for (hash, range, value) in rows {
            batch.add(table, hash.clone(), range.clone(), value.clone());
        }
        client.batch_write(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_query_delete() {
        let client = MemIndexClient::new();
        seed(
            &client,
            "index_1",
            &[
                entry("h1", b"r1", b"v1"),
                entry("h1", b"r2", b"v2"),
                entry("h2", b"r1", b"v3"),
            ],
        )
        .await;

        let collected = Mutex::new(Vec::new());
        client
            .query_pages(&[IndexQuery::new("index_1", "h1")], &|_, page| {
                collected
                    .lock()
                    .extend(page.rows().iter().map(|r| r.range_value.clone()));
                true
            })
            .await
            .unwrap();
        assert_eq!(*collected.lock(), vec![b"r1".to_vec(), b"r2".to_vec()]);

        let mut batch = client.new_write_batch();
        batch.delete("index_1", "h1", b"r1".to_vec());
        client.batch_write(batch).await.unwrap();
        assert_eq!(client.row_count("index_1"), 2);
    }

    #[tokio::test]
    async fn test_range_prefix_filter() {
        let client = MemIndexClient::new();
        seed(
            &client,
            "index_1",
            &[
                entry("h1", b"aa:1", b""),
                entry("h1", b"aa:2", b""),
                entry("h1", b"bb:1", b""),
            ],
        )
        .await;

        let count = Mutex::new(0);
        let query = IndexQuery::new("index_1", "h1").with_range_prefix(b"aa:".to_vec());
        client
            .query_pages(&[query], &|_, page| {
                *count.lock() += page.rows().len();
                true
            })
            .await
            .unwrap();
        assert_eq!(*count.lock(), 2);
    }

    #[tokio::test]
    async fn test_scan_table_segments_cover_all_rows() {
        let client = MemIndexClient::new();
        let rows: Vec<_> = (0..25)
            .map(|i| entry(&format!("h{:02}", i), b"r", b"v"))
            .collect();
        seed(&client, "chunks_1", &rows).await;

        let seen = Mutex::new(Vec::new());
        for segment in 0..3 {
            client
                .scan_table("chunks_1", segment, 3, &|_, page| {
                    seen.lock()
                        .extend(page.rows().iter().map(|r| r.hash_value.clone()));
                    true
                })
                .await
                .unwrap();
        }
        let mut seen = seen.into_inner();
        seen.sort();
        assert_eq!(seen.len(), 25);
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }
}
