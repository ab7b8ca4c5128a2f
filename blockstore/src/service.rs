use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use config::BlockStoreConfig;
use futures::stream::{self, Stream, StreamExt};
use models::{Matcher, TimeRange};
use parking_lot::{Mutex, RwLock};
use prometheus::{Histogram, HistogramOpts, Registry};
use protos::blockstore::block_store_client::BlockStoreClient;
use protos::blockstore::block_store_server::{BlockStore, BlockStoreServer};
use protos::blockstore::{
    InfoRequest, InfoResponse, LabelNamesRequest, LabelNamesResponse, LabelValuesRequest,
    LabelValuesResponse, SeriesRequest, SeriesResponse,
};
use snafu::ResultExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::{Channel, Server};
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use crate::bucket::{ObjectStoreRef, TenantBucket};
use crate::bucket_store::BucketStore;
use crate::error::{CommonSnafu, Result, TransportSnafu};
use crate::index_cache::IndexCache;
use crate::meta::{ConsistencyDelayMetaFilter, DeduplicateFilter, MetaFetcher, MetaFilter};

const INDEX_CACHE_ENTRIES: usize = 4096;

#[derive(Debug, Clone, Copy)]
enum SyncKind {
    Initial,
    Periodic,
}

struct Inner {
    config: BlockStoreConfig,
    bucket: ObjectStoreRef,
    // Index cache shared across all tenants.
    index_cache: Arc<IndexCache>,
    // One bucket store per tenant, created under the exclusive lock.
    stores: RwLock<HashMap<String, Arc<BucketStore>>>,
    sync_seconds: Histogram,
}

impl Inner {
    fn get_store(&self, user_id: &str) -> Option<Arc<BucketStore>> {
        self.stores.read().get(user_id).cloned()
    }

    /// Fast path under the shared lock; creation re-checks under the
    /// exclusive lock so no tenant ever gets two stores.
    fn get_or_create_store(&self, user_id: &str) -> Result<Arc<BucketStore>> {
        if let Some(store) = self.get_store(user_id) {
            return Ok(store);
        }

        let mut stores = self.stores.write();
        if let Some(store) = stores.get(user_id) {
            return Ok(store.clone());
        }

        info!("creating user bucket store, user: {}", user_id);
        let bucket = TenantBucket::new(user_id, self.bucket.clone());
        // Filter order matters: consistency delay first, then dedup.
        let filters: Vec<Box<dyn MetaFilter>> = vec![
            Box::new(ConsistencyDelayMetaFilter::new(
                self.config.consistency_delay_secs as i64 * 1000,
            )),
            Box::new(DeduplicateFilter),
        ];
        let fetcher = MetaFetcher::new(bucket, self.config.meta_sync_concurrency, filters);
        let store = Arc::new(BucketStore::new(
            user_id,
            fetcher,
            self.index_cache.clone(),
            self.config.max_concurrent,
            self.config.max_chunk_pool_bytes,
        )?);
        stores.insert(user_id.to_string(), store.clone());
        Ok(store)
    }

    /// Synchronizes every tenant visible at the bucket root through a
    /// bounded worker pool. Per-tenant failures are logged, never fatal; a
    /// failing root listing is.
    async fn sync_user_stores(&self, kind: SyncKind) -> Result<()> {
        let start = Instant::now();
        let result = self.sync_user_stores_inner(kind).await;
        self.sync_seconds.observe(start.elapsed().as_secs_f64());
        result
    }

    async fn sync_user_stores_inner(&self, kind: SyncKind) -> Result<()> {
        let entries = self.bucket.iter("").await?;

        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            let user_id = entry.trim_end_matches('/');
            if user_id.is_empty() {
                continue;
            }
            jobs.push((user_id.to_string(), self.get_or_create_store(user_id)?));
        }

        let concurrency = self.config.tenant_sync_concurrency.max(1);
        stream::iter(jobs)
            .for_each_concurrent(Some(concurrency), |(user_id, store)| async move {
                let result = match kind {
                    SyncKind::Initial => store.initial_sync().await,
                    SyncKind::Periodic => store.sync_blocks().await,
                };
                if let Err(e) = result {
                    warn!("failed to synchronize blocks for user {}: {}", user_id, e);
                }
            })
            .await;
        Ok(())
    }
}

/// Multi-tenant block store query server. Startup binds a loopback
/// listener, dials itself for the in-process client handle and runs an
/// initial catalog sync; afterwards a periodic sync loop keeps every
/// tenant's catalog fresh until `stop`.
pub struct UserStore {
    inner: Arc<Inner>,
    local_addr: Mutex<Option<SocketAddr>>,
    client: Mutex<Option<BlockStoreClient<Channel>>>,
    serve_shutdown: Mutex<Option<oneshot::Sender<()>>>,
    sync_shutdown: Mutex<Option<oneshot::Sender<()>>>,
    serve_handle: Mutex<Option<JoinHandle<()>>>,
    sync_handle: Mutex<Option<JoinHandle<()>>>,
}

impl UserStore {
    pub fn new(
        config: BlockStoreConfig,
        bucket: ObjectStoreRef,
        registerer: Option<&Registry>,
    ) -> Result<Self> {
        let sync_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "querier_blocks_sync_seconds",
                "The total time it takes to perform a sync stores",
            )
            .namespace("cortex")
            .buckets(vec![0.1, 1.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]),
        )
        .map_err(|e| {
            CommonSnafu {
                reason: format!("cannot create sync histogram: {}", e),
            }
            .build()
        })?;
        match registerer {
            Some(registry) => registry.register(Box::new(sync_seconds.clone())),
            None => prometheus::default_registry().register(Box::new(sync_seconds.clone())),
        }
        .map_err(|e| {
            CommonSnafu {
                reason: format!("cannot register sync histogram: {}", e),
            }
            .build()
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                bucket,
                index_cache: Arc::new(IndexCache::new(INDEX_CACHE_ENTRIES)),
                stores: RwLock::new(HashMap::new()),
                sync_seconds,
            }),
            local_addr: Mutex::new(None),
            client: Mutex::new(None),
            serve_shutdown: Mutex::new(None),
            sync_shutdown: Mutex::new(None),
            serve_handle: Mutex::new(None),
            sync_handle: Mutex::new(None),
        })
    }

    /// The `starting` phase. Any failure here aborts startup.
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            CommonSnafu {
                reason: format!("cannot bind block store listener: {}", e),
            }
            .build()
        })?;
        let addr = listener.local_addr().map_err(|e| {
            CommonSnafu {
                reason: format!("cannot resolve listener address: {}", e),
            }
            .build()
        })?;
        *self.local_addr.lock() = Some(addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let service = BlockStoreServer::new(BlockStoreService {
            inner: self.inner.clone(),
        });
        let serve_handle = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    shutdown_rx.await.ok();
                    info!("block store grpc server graceful shutdown");
                })
                .await;
            if let Err(e) = result {
                error!("block store grpc server failed: {}", e);
            }
        });
        *self.serve_shutdown.lock() = Some(shutdown_tx);
        *self.serve_handle.lock() = Some(serve_handle);

        // Dial ourselves; upstream query code talks to the store through
        // this client handle.
        let client = BlockStoreClient::connect(format!("http://{}", addr))
            .await
            .context(TransportSnafu)?;
        *self.client.lock() = Some(client);

        if self.inner.config.sync_interval_secs > 0 {
            // An initial full sync is required to serve queries at all.
            info!("synchronizing blocks for all tenants");
            self.inner.sync_user_stores(SyncKind::Initial).await?;
            info!("successfully synchronized blocks for all tenants");
        }

        self.spawn_sync_loop();
        Ok(())
    }

    /// The `running` phase: periodic per-tenant catalog refresh. With the
    /// interval disabled the loop only waits for shutdown and the catalogs
    /// stay empty.
    fn spawn_sync_loop(&self) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            if inner.config.sync_interval_secs == 0 {
                let _ = (&mut stop_rx).await;
                return;
            }
            // The initial sync just ran; wait a full interval first.
            let period = Duration::from_secs(inner.config.sync_interval_secs);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(period) => {
                        info!("synchronizing blocks for all tenants");
                        match inner.sync_user_stores(SyncKind::Periodic).await {
                            Ok(()) => info!("successfully synchronized blocks for all tenants"),
                            Err(e) => warn!("failed to synchronize blocks: {}", e),
                        }
                    }
                }
            }
        });
        *self.sync_shutdown.lock() = Some(stop_tx);
        *self.sync_handle.lock() = Some(handle);
    }

    /// The `stopping` phase: stop the RPC server and the sync loop.
    /// In-memory stores are released with the process.
    pub async fn stop(&self) {
        if let Some(tx) = self.serve_shutdown.lock().take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.sync_shutdown.lock().take() {
            let _ = tx.send(());
        }
        let serve_handle = self.serve_handle.lock().take();
        if let Some(handle) = serve_handle {
            let _ = handle.await;
        }
        let sync_handle = self.sync_handle.lock().take();
        if let Some(handle) = sync_handle {
            let _ = handle.await;
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// The self-dialed client handle, available after `start`.
    pub fn client(&self) -> Option<BlockStoreClient<Channel>> {
        self.client.lock().clone()
    }

    pub fn tenant_count(&self) -> usize {
        self.inner.stores.read().len()
    }
}

struct BlockStoreService {
    inner: Arc<Inner>,
}

fn user_from_metadata<T>(request: &Request<T>) -> std::result::Result<String, Status> {
    match request.metadata().get("user") {
        Some(value) => value
            .to_str()
            .map(|s| s.to_string())
            .map_err(|_| Status::invalid_argument("invalid user id in request metadata")),
        None => Err(Status::invalid_argument("no user id in request metadata")),
    }
}

fn matchers_from_request(matchers: &[protos::blockstore::LabelMatcher]) -> std::result::Result<Vec<Matcher>, Status> {
    matchers
        .iter()
        .map(Matcher::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Status::invalid_argument(e.to_string()))
}

#[tonic::async_trait]
impl BlockStore for BlockStoreService {
    async fn info(
        &self,
        request: Request<InfoRequest>,
    ) -> std::result::Result<Response<InfoResponse>, Status> {
        let user_id = user_from_metadata(&request)?;
        let store = match self.inner.get_store(&user_id) {
            Some(store) => store,
            // Unknown tenant: empty response, not an error.
            None => return Ok(Response::new(InfoResponse::default())),
        };

        let (min_time, max_time, blocks) = store.info();
        Ok(Response::new(InfoResponse {
            min_time,
            max_time,
            blocks,
        }))
    }

    type SeriesStream = Pin<Box<dyn Stream<Item = std::result::Result<SeriesResponse, Status>> + Send + 'static>>;

    async fn series(
        &self,
        request: Request<SeriesRequest>,
    ) -> std::result::Result<Response<Self::SeriesStream>, Status> {
        let user_id = user_from_metadata(&request)?;
        let (tx, rx) = mpsc::channel(128);

        let store = match self.inner.get_store(&user_id) {
            Some(store) => store,
            None => {
                // Unknown tenant: the stream ends immediately.
                drop(tx);
                let out: Self::SeriesStream = Box::pin(ReceiverStream::new(rx));
                return Ok(Response::new(out));
            }
        };

        let req = request.into_inner();
        let matchers = matchers_from_request(&req.matchers)?;
        let range = TimeRange::new(req.min_time, req.max_time);

        tokio::spawn(async move {
            let series = match store.series(range, &matchers).await {
                Ok(series) => series,
                Err(e) => {
                    let status = match &e {
                        crate::Error::ChunkPoolExhausted { .. } => {
                            Status::resource_exhausted(e.to_string())
                        }
                        _ => Status::internal(e.to_string()),
                    };
                    let _ = tx.send(Err(status)).await;
                    return;
                }
            };
            for labels in series {
                let response = SeriesResponse {
                    series: Some((&labels).into()),
                };
                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });

        let out: Self::SeriesStream = Box::pin(ReceiverStream::new(rx));
        Ok(Response::new(out))
    }

    async fn label_names(
        &self,
        request: Request<LabelNamesRequest>,
    ) -> std::result::Result<Response<LabelNamesResponse>, Status> {
        let user_id = user_from_metadata(&request)?;
        let store = match self.inner.get_store(&user_id) {
            Some(store) => store,
            None => return Ok(Response::new(LabelNamesResponse::default())),
        };

        let req = request.into_inner();
        let names = store
            .label_names(TimeRange::new(req.min_time, req.max_time))
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(LabelNamesResponse { names }))
    }

    async fn label_values(
        &self,
        request: Request<LabelValuesRequest>,
    ) -> std::result::Result<Response<LabelValuesResponse>, Status> {
        let user_id = user_from_metadata(&request)?;
        let store = match self.inner.get_store(&user_id) {
            Some(store) => store,
            None => return Ok(Response::new(LabelValuesResponse::default())),
        };

        let req = request.into_inner();
        let values = store
            .label_values(&req.label, TimeRange::new(req.min_time, req.max_time))
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(LabelValuesResponse { values }))
    }
}
