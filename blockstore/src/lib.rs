pub use bucket::{MemObjectStore, ObjectStore, ObjectStoreRef, TenantBucket};
pub use bucket_store::BucketStore;
pub use error::{Error, Result};
pub use index_cache::IndexCache;
pub use meta::{BlockMeta, ConsistencyDelayMetaFilter, DeduplicateFilter, MetaFetcher, MetaFilter};
pub use service::UserStore;

mod bucket;
mod bucket_store;
mod error;
mod index_cache;
mod meta;
mod service;
