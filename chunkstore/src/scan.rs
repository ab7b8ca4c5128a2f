use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::error;

use crate::chunk::Chunk;
use crate::index::{ReadBatch, RowPage};
use crate::metrics::PAGES_SCANNED;
use crate::store::{ChunkStore, ScanPageCallback};

/// Tenant id from an index/chunk hash value, which leads with the numeric
/// org followed by a `/` or `:` separator. Anything unparsable maps to 0.
pub fn org_from_hash(hash_value: &str) -> i64 {
    let lead = hash_value
        .split(|c| c == '/' || c == ':')
        .next()
        .unwrap_or("");
    lead.parse().unwrap_or(0)
}

/// Per-tenant row counts, merged across segments when the scan completes.
#[derive(Debug, Default)]
pub struct ScanSummary {
    counts: HashMap<i64, u64>,
}

impl ScanSummary {
    pub fn accumulate(&mut self, other: &ScanSummary) {
        for (org, count) in &other.counts {
            *self.counts.entry(*org).or_default() += count;
        }
    }

    pub fn counts(&self) -> &HashMap<i64, u64> {
        &self.counts
    }

    pub fn print(&self) {
        for (org, count) in &self.counts {
            println!("{}, {}", org, count);
        }
    }
}

/// Handles the pages of one scan segment. Pages are forwarded to an owned
/// worker task, keeping the per-handler state single-threaded while the
/// segments run concurrently.
#[derive(Debug)]
pub struct ScanHandler {
    tx: Mutex<Option<UnboundedSender<RowPage>>>,
    worker: Mutex<Option<JoinHandle<ScanSummary>>>,
}

impl ScanHandler {
    pub fn new(
        table_name: String,
        delete_orgs: HashSet<i64>,
        reindex_store: Option<Arc<ChunkStore>>,
    ) -> Self {
        let (tx, mut rx) = unbounded_channel::<RowPage>();
        let worker = tokio::spawn(async move {
            let mut summary = ScanSummary::default();
            while let Some(page) = rx.recv().await {
                PAGES_SCANNED.with_label_values(&[&table_name]).inc();
                for row in &page.rows {
                    let org = org_from_hash(&row.hash_value);
                    if org <= 0 {
                        continue;
                    }
                    *summary.counts.entry(org).or_default() += 1;

                    if delete_orgs.contains(&org) {
                        // Deletion is a capability of this handler but is
                        // intentionally inert; flagged orgs are only counted.
                        continue;
                    }
                    if let Some(store) = &reindex_store {
                        let chunk = match Chunk::decode(&row.value) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                error!("chunk decode error: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = store.index_chunk(chunk).await {
                            error!("indexing error: {}", e);
                            continue;
                        }
                    }
                }
            }
            summary
        });

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// The page callback to hand to `ChunkStore::scan` for this segment.
    pub fn page_callback(self: &Arc<Self>) -> ScanPageCallback {
        let handler = self.clone();
        Arc::new(move |page: &dyn ReadBatch| {
            let owned = RowPage {
                rows: page.rows().to_vec(),
            };
            if let Some(tx) = handler.tx.lock().as_ref() {
                let _ = tx.send(owned);
            }
        })
    }

    /// Closes the page feed and waits for the worker, returning the
    /// segment's summary.
    pub async fn finish(&self) -> ScanSummary {
        self.tx.lock().take();
        let worker = self.worker.lock().take();
        match worker {
            Some(handle) => handle.await.unwrap_or_default(),
            None => ScanSummary::default(),
        }
    }
}
