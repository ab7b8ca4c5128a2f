use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chunkstore::{ChunkStore, MemChunkClient, MemIndexClient, ScanHandler, ScanSummary};
use config::SECONDS_IN_WEEK;

use crate::{check_fatal, ScanArgs};

pub async fn run(args: ScanArgs) {
    let config = crate::load_config(&args.config);

    serve_metrics(&args.address);

    let delete_orgs = load_delete_orgs(&args.delete_orgs_file);

    let week = if args.week == 0 {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        now_secs / SECONDS_IN_WEEK
    } else {
        args.week
    };
    let table_time = week * SECONDS_IN_WEEK * 1000;

    // Driver injection point: deployments swap in their index and chunk
    // store backends here.
    let index = Arc::new(MemIndexClient::new());
    let chunks = Arc::new(MemChunkClient::new());
    let limits = Arc::new(config.limits.clone());

    let chunk_store = Arc::new(check_fatal(ChunkStore::new(
        config.store.clone(),
        &config.schema,
        index.clone(),
        chunks.clone(),
        limits.clone(),
    )));

    let reindex_store = if args.reindex_prefix.is_empty() {
        None
    } else {
        let mut reindex_schema = config.schema.clone();
        for entry in &mut reindex_schema.configs {
            entry.index_tables.prefix = args.reindex_prefix.clone();
        }
        Some(Arc::new(check_fatal(ChunkStore::new(
            config.store.clone(),
            &reindex_schema,
            index.clone(),
            chunks,
            limits,
        ))))
    };

    let table_name = config
        .schema
        .active_at(table_time)
        .map(|entry| entry.chunk_tables.table_for(table_time))
        .unwrap_or_default();
    println!("table {}", table_name);

    let handlers: Vec<Arc<ScanHandler>> = (0..args.segments.max(1))
        .map(|_| {
            Arc::new(ScanHandler::new(
                table_name.clone(),
                delete_orgs.clone(),
                reindex_store.clone(),
            ))
        })
        .collect();
    let callbacks = handlers.iter().map(|h| h.page_callback()).collect();

    check_fatal(
        chunk_store
            .scan(
                table_time,
                table_time,
                !args.reindex_prefix.is_empty(),
                callbacks,
            )
            .await,
    );

    if let Some(store) = &reindex_store {
        store.stop();
    }

    let mut totals = ScanSummary::default();
    for handler in &handlers {
        totals.accumulate(&handler.finish().await);
    }
    totals.print();

    chunk_store.stop();
}

/// Whitespace-separated integer tenant ids.
fn load_delete_orgs(path: &str) -> HashSet<i64> {
    let mut orgs = HashSet::new();
    if path.is_empty() {
        return orgs;
    }
    let content = check_fatal(std::fs::read_to_string(path));
    for field in content.split_whitespace() {
        orgs.insert(check_fatal(field.parse::<i64>()));
    }
    orgs
}

fn serve_metrics(address: &str) {
    use warp::Filter;

    // ":6060" listens on every interface, the usual Go shorthand.
    let normalized = if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    };
    let addr: SocketAddr = check_fatal(normalized.parse());

    let metrics = warp::path!("metrics").map(|| {
        let buffer = chunkstore::metrics::gather_metrics();
        warp::http::Response::new(warp::hyper::Body::from(buffer))
    });
    tokio::spawn(warp::serve(metrics).run(addr));
}
