use std::sync::Arc;

use async_trait::async_trait;
use blockstore::{BlockMeta, MemObjectStore, ObjectStore, ObjectStoreRef, UserStore};
use bytes::Bytes;
use config::BlockStoreConfig;
use models::Labels;
use prometheus::Registry;
use protos::blockstore::{
    InfoRequest, LabelMatcher, LabelValuesRequest, MatchType, SeriesRequest,
};
use tokio_stream::StreamExt;
use tonic::Request;

fn block(id: &str, min_time: i64, max_time: i64, jobs: &[&str]) -> BlockMeta {
    BlockMeta {
        id: id.to_string(),
        min_time,
        max_time,
        series: jobs
            .iter()
            .map(|job| Labels::from_pairs([("__name__", "up"), ("job", *job)]))
            .collect(),
        compaction_sources: Vec::new(),
        created_at: 0,
    }
}

async fn seeded_bucket() -> MemObjectStore {
    let store = MemObjectStore::new();
    for (user, meta) in [
        ("3", block("b1", 0, 1000, &["api", "web"])),
        ("3", block("b2", 1000, 2000, &["api"])),
        ("8", block("b1", 0, 1000, &["db"])),
    ] {
        let name = format!("{}/{}/meta.json", user, meta.id);
        store
            .upload(&name, Bytes::from(serde_json::to_vec(&meta).unwrap()))
            .await
            .unwrap();
    }
    store
}

fn test_config() -> BlockStoreConfig {
    BlockStoreConfig {
        // Long interval: the initial sync runs, the periodic loop stays out
        // of the way of test timing.
        sync_interval_secs: 3600,
        tenant_sync_concurrency: 2,
        ..Default::default()
    }
}

async fn started_store(bucket: ObjectStoreRef) -> UserStore {
    let registry = Registry::new();
    let store = UserStore::new(test_config(), bucket, Some(&registry)).unwrap();
    store.start().await.unwrap();
    store
}

fn with_user<T>(message: T, user: &str) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert("user", user.parse().unwrap());
    request
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_info_routes_by_tenant() {
    let store = started_store(Arc::new(seeded_bucket().await)).await;
    let mut client = store.client().unwrap();

    let info = client
        .info(with_user(InfoRequest {}, "3"))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(info.blocks, 2);
    assert_eq!(info.min_time, 0);
    assert_eq!(info.max_time, 2000);

    let info = client
        .info(with_user(InfoRequest {}, "8"))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(info.blocks, 1);

    // Unknown tenant: empty response, not an error.
    let info = client
        .info(with_user(InfoRequest {}, "999"))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(info.blocks, 0);

    store.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_user_metadata_is_invalid_argument() {
    let store = started_store(Arc::new(seeded_bucket().await)).await;
    let mut client = store.client().unwrap();

    let status = client.info(Request::new(InfoRequest {})).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);

    store.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_series_streams_only_the_tenants_data() {
    let store = started_store(Arc::new(seeded_bucket().await)).await;
    let mut client = store.client().unwrap();

    let request = SeriesRequest {
        min_time: 0,
        max_time: 2000,
        matchers: vec![LabelMatcher {
            r#type: MatchType::Equal as i32,
            name: "job".to_string(),
            value: "api".to_string(),
        }],
    };
    let mut stream = client
        .series(with_user(request, "3"))
        .await
        .unwrap()
        .into_inner();

    let mut series = Vec::new();
    while let Some(response) = stream.next().await {
        series.push(response.unwrap().series.unwrap());
    }
    assert_eq!(series.len(), 1);
    assert!(series[0]
        .labels
        .iter()
        .any(|l| l.name == "job" && l.value == "api"));

    // Tenant 8 has no job=api series at all.
    let request = SeriesRequest {
        min_time: 0,
        max_time: 2000,
        matchers: vec![LabelMatcher {
            r#type: MatchType::Equal as i32,
            name: "job".to_string(),
            value: "api".to_string(),
        }],
    };
    let mut stream = client
        .series(with_user(request, "8"))
        .await
        .unwrap()
        .into_inner();
    assert!(stream.next().await.is_none());

    store.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_label_values_over_rpc() {
    let store = started_store(Arc::new(seeded_bucket().await)).await;
    let mut client = store.client().unwrap();

    let values = client
        .label_values(with_user(
            LabelValuesRequest {
                label: "job".to_string(),
                min_time: 0,
                max_time: 2000,
            },
            "3",
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(values.values, vec!["api".to_string(), "web".to_string()]);

    store.stop().await;
}

/// Object store whose listings fail under one tenant's prefix. Used to show
/// a failing tenant does not break the others' sync.
#[derive(Debug)]
struct FailingTenantStore {
    inner: MemObjectStore,
    failing_prefix: String,
}

#[async_trait]
impl ObjectStore for FailingTenantStore {
    async fn iter(&self, prefix: &str) -> blockstore::Result<Vec<String>> {
        if prefix.starts_with(&self.failing_prefix) {
            return Err(blockstore::Error::CommonError {
                reason: "injected failure".to_string(),
            });
        }
        self.inner.iter(prefix).await
    }

    async fn get(&self, name: &str) -> blockstore::Result<Bytes> {
        self.inner.get(name).await
    }

    async fn exists(&self, name: &str) -> blockstore::Result<bool> {
        self.inner.exists(name).await
    }

    async fn upload(&self, name: &str, payload: Bytes) -> blockstore::Result<()> {
        self.inner.upload(name, payload).await
    }

    async fn delete(&self, name: &str) -> blockstore::Result<()> {
        self.inner.delete(name).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sync_survives_failing_tenant() {
    let bucket = Arc::new(FailingTenantStore {
        inner: seeded_bucket().await,
        failing_prefix: "3/".to_string(),
    });
    let store = started_store(bucket).await;

    // Both tenants got a bucket store; the healthy one has its catalog.
    assert_eq!(store.tenant_count(), 2);
    let mut client = store.client().unwrap();
    let info = client
        .info(with_user(InfoRequest {}, "8"))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(info.blocks, 1);

    store.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resync_does_not_duplicate_stores() {
    let store = started_store(Arc::new(seeded_bucket().await)).await;
    assert_eq!(store.tenant_count(), 2);
    store.stop().await;
}
