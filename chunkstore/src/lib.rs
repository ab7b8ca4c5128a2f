pub use cache::{Cache, CacheRef, MemCache};
pub use chunk::{Chunk, ChunkData, Sample};
pub use client::{ChunkClient, ChunkClientRef, MemChunkClient};
pub use error::{Error, Result};
pub use fetcher::ChunkFetcher;
pub use index::{
    IndexClient, IndexClientRef, IndexEntry, IndexQuery, MemIndexClient, ReadBatch, WriteBatch,
};
pub use schema::{Schema, SchemaRegistry};
pub use scan::{org_from_hash, ScanHandler, ScanSummary};
pub use store::{ChunkStore, ScanPageCallback, StoreLimits};

mod cache;
mod chunk;
mod client;
mod error;
mod fetcher;
mod index;
pub mod metrics;
mod scan;
mod schema;
mod store;
