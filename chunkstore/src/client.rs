use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::chunk::Chunk;
use crate::error::{ObjectNotFoundSnafu, Result};

pub type ChunkClientRef = Arc<dyn ChunkClient>;

/// Abstract blob store for opaque chunk payloads keyed by external key.
#[async_trait]
pub trait ChunkClient: Send + Sync + Debug {
    /// Stores the encoded payload of every chunk. Chunks must be encoded.
    async fn put_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Fills the payloads of the given chunk references, in input order.
    /// A missing object surfaces as `ObjectNotFound`.
    async fn get_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>>;

    /// Removes one payload. `ObjectNotFound` is surfaced; the store layer
    /// treats it as success.
    async fn delete_chunk(&self, chunk_id: &str) -> Result<()>;
}

/// HashMap-backed chunk client, the reference implementation.
#[derive(Debug, Default)]
pub struct MemChunkClient {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemChunkClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ChunkClient for MemChunkClient {
    async fn put_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut objects = self.objects.write();
        for chunk in chunks {
            objects.insert(chunk.external_key(), chunk.encoded_bytes()?);
        }
        Ok(())
    }

    async fn get_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let objects = self.objects.read();
        let mut out = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            let key = chunk.external_key();
            let buf = objects
                .get(&key)
                .ok_or_else(|| ObjectNotFoundSnafu { key: key.clone() }.build())?;
            chunk.fill_from(Chunk::decode(buf)?);
            out.push(chunk);
        }
        Ok(out)
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let removed = self.objects.write().remove(chunk_id);
        if removed.is_none() {
            return Err(ObjectNotFoundSnafu { key: chunk_id }.build());
        }
        Ok(())
    }
}
