use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{ObjectNotFoundSnafu, Result};

pub type ObjectStoreRef = Arc<dyn ObjectStore>;

/// Abstract object storage: flat keyspace with `/`-separated pseudo
/// directories, the contract of every blob-store driver.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Immediate children under a prefix. Pseudo directories keep their
    /// trailing slash.
    async fn iter(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get(&self, name: &str) -> Result<Bytes>;

    async fn exists(&self, name: &str) -> Result<bool>;

    async fn upload(&self, name: &str, payload: Bytes) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// BTreeMap-backed object store, the reference implementation.
#[derive(Debug, Default)]
pub struct MemObjectStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemObjectStore {
    async fn iter(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read();
        let mut children = Vec::new();
        for name in objects.keys() {
            let rest = match name.strip_prefix(prefix) {
                Some(rest) => rest,
                None => continue,
            };
            let child = match rest.split_once('/') {
                Some((dir, _)) => format!("{}/", dir),
                None => rest.to_string(),
            };
            if children.last() != Some(&child) {
                children.push(child);
            }
        }
        Ok(children)
    }

    async fn get(&self, name: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ObjectNotFoundSnafu { name }.build())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(name))
    }

    async fn upload(&self, name: &str, payload: Bytes) -> Result<()> {
        self.objects.write().insert(name.to_string(), payload);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if self.objects.write().remove(name).is_none() {
            return Err(ObjectNotFoundSnafu { name }.build());
        }
        Ok(())
    }
}

/// A view over one tenant's prefix of a shared bucket.
#[derive(Debug, Clone)]
pub struct TenantBucket {
    user_id: String,
    store: ObjectStoreRef,
}

impl TenantBucket {
    pub fn new(user_id: impl Into<String>, store: ObjectStoreRef) -> Self {
        Self {
            user_id: user_id.into(),
            store,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}/{}", self.user_id, name)
    }

    pub async fn iter(&self, prefix: &str) -> Result<Vec<String>> {
        self.store.iter(&self.full_name(prefix)).await
    }

    pub async fn get(&self, name: &str) -> Result<Bytes> {
        self.store.get(&self.full_name(name)).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        self.store.exists(&self.full_name(name)).await
    }
}
