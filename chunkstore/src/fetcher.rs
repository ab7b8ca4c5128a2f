use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::CacheRef;
use crate::chunk::Chunk;
use crate::client::ChunkClientRef;
use crate::error::Result;
use crate::metrics::CACHE_CORRUPT_CHUNKS;

/// Sentinel stored instead of the payload when stub mode is on.
const CACHE_STUB: &[u8] = b"\x00";

const WRITE_BACK_QUEUE: usize = 1024;

/// Cache-through read path for chunks. Freshly fetched payloads are written
/// back to the cache by a background task; the write never blocks a return.
#[derive(Debug)]
pub struct ChunkFetcher {
    cache: CacheRef,
    cache_stubs: bool,
    client: ChunkClientRef,
    write_back_tx: Mutex<Option<mpsc::Sender<(String, Bytes)>>>,
}

impl ChunkFetcher {
    pub fn new(cache: CacheRef, cache_stubs: bool, client: ChunkClientRef) -> Self {
        let (tx, mut rx) = mpsc::channel::<(String, Bytes)>(WRITE_BACK_QUEUE);
        let bg_cache = cache.clone();
        tokio::spawn(async move {
            while let Some((key, buf)) = rx.recv().await {
                if let Err(e) = bg_cache.store(&key, buf).await {
                    warn!("could not store chunk in chunk cache, key: {}, err: {}", key, e);
                }
            }
            debug!("chunk cache write-back worker stopped");
        });

        Self {
            cache,
            cache_stubs,
            client,
            write_back_tx: Mutex::new(Some(tx)),
        }
    }

    /// Materializes payloads for `chunks`, where `keys[i]` is the external
    /// key of `chunks[i]`. Cache hits are decoded in place; the remainder is
    /// fetched from the chunk client in one batched call. Output order
    /// follows `keys`.
    pub async fn fetch_chunks(&self, chunks: Vec<Chunk>, keys: Vec<String>) -> Result<Vec<Chunk>> {
        let mut by_key: HashMap<String, Chunk> = HashMap::with_capacity(chunks.len());
        for (chunk, key) in chunks.into_iter().zip(keys.iter()) {
            by_key.insert(key.clone(), chunk);
        }

        let (hits, mut missing) = self.cache.fetch(&keys).await;

        let mut materialized: HashMap<String, Chunk> = HashMap::with_capacity(keys.len());
        for (key, buf) in hits {
            if buf.as_ref() == CACHE_STUB {
                // Dedup sentinel, not a payload.
                missing.push(key);
                continue;
            }
            match Chunk::decode(&buf) {
                Ok(decoded) => {
                    if let Some(mut chunk) = by_key.remove(&key) {
                        chunk.fill_from(decoded);
                        materialized.insert(key, chunk);
                    }
                }
                Err(e) => {
                    CACHE_CORRUPT_CHUNKS.inc();
                    debug!("corrupt chunk in cache, key: {}, err: {}", key, e);
                    missing.push(key);
                }
            }
        }

        if !missing.is_empty() {
            let to_fetch: Vec<Chunk> = missing
                .iter()
                .filter_map(|key| by_key.remove(key))
                .collect();
            let fetched = self.client.get_chunks(to_fetch).await?;
            self.write_back(&fetched);
            for chunk in fetched {
                materialized.insert(chunk.external_key(), chunk);
            }
        }

        Ok(keys
            .iter()
            .filter_map(|key| materialized.remove(key))
            .collect())
    }

    /// Opportunistic cache population after a successful write, so a
    /// subsequent read hits. Failures are the background worker's to log.
    pub fn write_back_cache(&self, chunks: &[Chunk]) -> Result<()> {
        self.write_back(chunks);
        Ok(())
    }

    fn write_back(&self, chunks: &[Chunk]) {
        let guard = self.write_back_tx.lock();
        let tx = match guard.as_ref() {
            Some(tx) => tx,
            None => return,
        };
        for chunk in chunks {
            let buf = if self.cache_stubs {
                Bytes::from_static(CACHE_STUB)
            } else {
                match chunk.encoded_bytes() {
                    Ok(buf) => buf,
                    Err(_) => continue,
                }
            };
            if tx.try_send((chunk.external_key(), buf)).is_err() {
                warn!("chunk cache write-back queue full, dropping entry");
            }
        }
    }

    /// Halts the background write-back worker.
    pub fn stop(&self) {
        self.write_back_tx.lock().take();
        self.cache.stop();
    }
}
