use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use config::CacheConfig;
use models::utils::bkdr_hash::BkdrHasher;
use parking_lot::Mutex;

use crate::error::Result;

pub type CacheRef = Arc<dyn Cache>;

/// A concurrent-safe byte cache. Backing implementations may be remote;
/// failures are for the caller to absorb.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    async fn store(&self, key: &str, buf: Bytes) -> Result<()>;

    /// Looks up all keys, returning (hits, missing keys). Hit order follows
    /// the input order of the found keys.
    async fn fetch(&self, keys: &[String]) -> (Vec<(String, Bytes)>, Vec<String>);

    fn stop(&self) {}
}

#[derive(Debug)]
struct Entry {
    buf: Bytes,
    inserted: Instant,
}

#[derive(Debug, Default)]
struct Shard {
    entries: HashMap<String, Entry>,
    insert_order: VecDeque<String>,
}

const NUM_SHARD_BITS: usize = 4;
const NUM_SHARDS: usize = 1 << NUM_SHARD_BITS;

/// Sharded in-process cache with a capacity bound and optional TTL.
#[derive(Debug)]
pub struct MemCache {
    shards: Vec<Mutex<Shard>>,
    per_shard_capacity: usize,
    ttl: Option<Duration>,
}

impl MemCache {
    pub fn new(config: &CacheConfig) -> Self {
        let per_shard = (config.capacity + (NUM_SHARDS - 1)) / NUM_SHARDS;
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(Shard::default())).collect(),
            per_shard_capacity: per_shard.max(1),
            ttl,
        }
    }

    fn shard(&self, key: &str) -> &Mutex<Shard> {
        let mut hasher = BkdrHasher::new();
        hasher.hash_with(key.as_bytes());
        &self.shards[(hasher.number() % NUM_SHARDS as u64) as usize]
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        match self.ttl {
            Some(ttl) => entry.inserted.elapsed() > ttl,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemCache {
    async fn store(&self, key: &str, buf: Bytes) -> Result<()> {
        let mut shard = self.shard(key).lock();
        if shard.entries.insert(
            key.to_string(),
            Entry {
                buf,
                inserted: Instant::now(),
            },
        ).is_none()
        {
            shard.insert_order.push_back(key.to_string());
        }
        while shard.entries.len() > self.per_shard_capacity {
            match shard.insert_order.pop_front() {
                Some(oldest) => {
                    shard.entries.remove(&oldest);
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn fetch(&self, keys: &[String]) -> (Vec<(String, Bytes)>, Vec<String>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in keys {
            let mut shard = self.shard(key).lock();
            match shard.entries.get(key) {
                Some(entry) if !self.is_expired(entry) => {
                    found.push((key.clone(), entry.buf.clone()));
                }
                Some(_) => {
                    shard.entries.remove(key);
                    missing.push(key.clone());
                }
                None => missing.push(key.clone()),
            }
        }
        (found, missing)
    }
}
