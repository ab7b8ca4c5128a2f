use std::collections::HashSet;
use std::sync::Arc;

use chunkstore::{
    org_from_hash, Chunk, ChunkData, ChunkStore, Error, IndexClient, MemChunkClient,
    MemIndexClient, Sample, ScanHandler, ScanSummary,
};
use config::{LimitsConfig, SchemaConfig, StoreConfig};
use models::{Labels, MatchType, Matcher, TimeRange};

fn new_store() -> (Arc<ChunkStore>, Arc<MemIndexClient>, Arc<MemChunkClient>) {
    new_store_with(StoreConfig::default(), LimitsConfig::default())
}

fn new_store_with(
    config: StoreConfig,
    limits: LimitsConfig,
) -> (Arc<ChunkStore>, Arc<MemIndexClient>, Arc<MemChunkClient>) {
    let index = Arc::new(MemIndexClient::new());
    let chunks = Arc::new(MemChunkClient::new());
    let store = ChunkStore::new(
        config,
        &SchemaConfig::default(),
        index.clone(),
        chunks.clone(),
        Arc::new(limits),
    )
    .unwrap();
    (Arc::new(store), index, chunks)
}

fn chunk(user: &str, metric: &str, job: &str, from: i64, through: i64) -> Chunk {
    let labels = Labels::from_pairs([("__name__", metric), ("job", job)]);
    let data = ChunkData::new(vec![
        Sample::new(from, 1.0),
        Sample::new((from + through) / 2, 2.0),
        Sample::new(through, 3.0),
    ]);
    let mut chunk = Chunk::new(user, labels, data).unwrap();
    chunk.encode().unwrap();
    chunk
}

fn eq(name: &str, value: &str) -> Matcher {
    Matcher::eq(name, value)
}

#[tokio::test]
async fn test_put_then_get_returns_chunk() {
    let (store, _, _) = new_store();
    let c = chunk("7", "http_requests", "api", 1000, 2000);
    store.put(vec![c.clone()]).await.unwrap();

    let got = store
        .get(
            "7",
            1500,
            1800,
            vec![eq("__name__", "http_requests"), eq("job", "api")],
        )
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].external_key(), c.external_key());
    assert_eq!(got[0].metric.get("job"), Some("api"));
}

#[tokio::test]
async fn test_get_outside_interval_is_empty() {
    let (store, _, _) = new_store();
    store
        .put(vec![chunk("7", "http_requests", "api", 1000, 2000)])
        .await
        .unwrap();

    let got = store
        .get("7", 3000, 4000, vec![eq("__name__", "http_requests")])
        .await
        .unwrap();
    assert!(got.is_empty());
}

#[tokio::test]
async fn test_get_requires_metric_name() {
    let (store, _, _) = new_store();
    let err = store
        .get("7", 1500, 1800, vec![eq("job", "api")])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(err.to_string().contains("metric name"));
}

#[tokio::test]
async fn test_get_through_before_from_is_400() {
    let (store, _, _) = new_store();
    let err = store
        .get("7", 2000, 1000, vec![eq("__name__", "x")])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(matches!(err, Error::InvalidQueryRange { .. }));
}

#[tokio::test]
async fn test_from_in_future_shortcuts_to_empty() {
    let (store, _, _) = new_store();
    let future = models::Timestamp::MAX / 2;
    let got = store
        .get("7", future, future + 10, vec![eq("__name__", "x")])
        .await
        .unwrap();
    assert!(got.is_empty());
}

#[tokio::test]
async fn test_query_too_long_is_400() {
    let limits = LimitsConfig {
        max_query_length: 1000,
        ..Default::default()
    };
    let (store, _, _) = new_store_with(StoreConfig::default(), limits);
    let err = store
        .get("7", 0, 10_000, vec![eq("__name__", "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueryTooLong { .. }));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_too_many_chunks_is_400() {
    let limits = LimitsConfig {
        max_chunks_per_query: 1,
        ..Default::default()
    };
    let (store, _, _) = new_store_with(StoreConfig::default(), limits);
    store
        .put(vec![
            chunk("7", "up", "api", 1000, 2000),
            chunk("7", "up", "web", 1000, 2000),
        ])
        .await
        .unwrap();

    let err = store
        .get("7", 1000, 2000, vec![eq("__name__", "up")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TooManyChunks { .. }));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_put_is_idempotent() {
    let (store, index, chunks) = new_store();
    let c = chunk("7", "up", "api", 1000, 2000);
    store.put(vec![c.clone()]).await.unwrap();
    let rows_after_first = index.row_count("index_0");
    store.put(vec![c.clone()]).await.unwrap();

    assert_eq!(index.row_count("index_0"), rows_after_first);
    assert_eq!(chunks.len(), 1);
}

#[tokio::test]
async fn test_matcher_intersection() {
    let (store, _, _) = new_store();
    let api = chunk("7", "up", "api", 1000, 2000);
    let web = chunk("7", "up", "web", 1000, 2000);
    store.put(vec![api.clone(), web.clone()]).await.unwrap();

    // Equality matcher restricts to one series.
    let got = store
        .get(
            "7",
            1000,
            2000,
            vec![eq("__name__", "up"), eq("job", "api")],
        )
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].metric.get("job"), Some("api"));

    // A regex matcher that cannot match empty goes through the index too.
    let got = store
        .get(
            "7",
            1000,
            2000,
            vec![
                eq("__name__", "up"),
                Matcher::new(MatchType::Regex, "job", "a.+").unwrap(),
            ],
        )
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].metric.get("job"), Some("api"));

    // Matchers intersect: disjoint equality predicates return nothing.
    let got = store
        .get(
            "7",
            1000,
            2000,
            vec![
                eq("__name__", "up"),
                eq("job", "api"),
                eq("job", "web"),
            ],
        )
        .await
        .unwrap();
    assert!(got.is_empty());
}

#[tokio::test]
async fn test_empty_matching_predicates_post_filter() {
    let (store, _, _) = new_store();
    store
        .put(vec![
            chunk("7", "up", "api", 1000, 2000),
            chunk("7", "up", "web", 1000, 2000),
        ])
        .await
        .unwrap();

    let got = store
        .get(
            "7",
            1000,
            2000,
            vec![
                eq("__name__", "up"),
                Matcher::new(MatchType::NotEqual, "job", "web").unwrap(),
            ],
        )
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].metric.get("job"), Some("api"));
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let (store, _, _) = new_store();
    store
        .put(vec![chunk("7", "up", "api", 1000, 2000)])
        .await
        .unwrap();

    let got = store
        .get("8", 1000, 2000, vec![eq("__name__", "up")])
        .await
        .unwrap();
    assert!(got.is_empty());
}

#[tokio::test]
async fn test_label_values_for_metric_name() {
    let (store, _, _) = new_store();
    store
        .put(vec![
            chunk("7", "up", "api", 1000, 2000),
            chunk("7", "up", "web", 1000, 2000),
            chunk("7", "other", "db", 1000, 2000),
        ])
        .await
        .unwrap();

    let values = store
        .label_values_for_metric_name("7", 1000, 2000, "up", "job")
        .await
        .unwrap();
    assert_eq!(values, vec!["api".to_string(), "web".to_string()]);
}

#[tokio::test]
async fn test_label_names_for_metric_name() {
    let (store, _, _) = new_store();
    store
        .put(vec![chunk("7", "up", "api", 1000, 2000)])
        .await
        .unwrap();

    let names = store
        .label_names_for_metric_name("7", 1000, 2000, "up")
        .await
        .unwrap();
    assert_eq!(names, vec!["__name__".to_string(), "job".to_string()]);
}

#[tokio::test]
async fn test_delete_chunk() {
    let (store, _, chunks) = new_store();
    let c = chunk("7", "up", "api", 1000, 2000);
    store.put(vec![c.clone()]).await.unwrap();

    store
        .delete_chunk(
            c.from(),
            c.through(),
            "7",
            &c.external_key(),
            &c.metric,
            None,
        )
        .await
        .unwrap();

    assert!(chunks.is_empty());
    let got = store
        .get("7", 1000, 2000, vec![eq("__name__", "up")])
        .await
        .unwrap();
    assert!(got.is_empty());

    // Deleting again is idempotent; the missing payload is not an error.
    store
        .delete_chunk(
            c.from(),
            c.through(),
            "7",
            &c.external_key(),
            &c.metric,
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_partial_delete_rebounds_chunk() {
    let (store, _, _) = new_store();
    let c = chunk("7", "up", "api", 1000, 2000);
    let original_key = c.external_key();
    store.put(vec![c.clone()]).await.unwrap();

    store
        .delete_chunk(
            c.from(),
            c.through(),
            "7",
            &original_key,
            &c.metric,
            Some(TimeRange::new(1200, 1499)),
        )
        .await
        .unwrap();

    let got = store
        .get("7", 1000, 2000, vec![eq("__name__", "up")])
        .await
        .unwrap();
    assert_eq!(got.len(), 2);
    let mut ranges: Vec<TimeRange> = got.iter().map(|c| c.time_range).collect();
    ranges.sort();
    assert_eq!(ranges[0], TimeRange::new(1000, 1199));
    assert_eq!(ranges[1], TimeRange::new(1500, 2000));
    assert!(got.iter().all(|c| c.external_key() != original_key));
}

#[tokio::test]
async fn test_partial_delete_requires_overlap() {
    let (store, _, _) = new_store();
    let c = chunk("7", "up", "api", 1000, 2000);
    store.put(vec![c.clone()]).await.unwrap();

    let err = store
        .delete_chunk(
            c.from(),
            c.through(),
            "7",
            &c.external_key(),
            &c.metric,
            Some(TimeRange::new(5000, 6000)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PartialDeleteNoOverlap));
}

#[tokio::test]
async fn test_get_chunk_refs_unimplemented() {
    let (store, _, _) = new_store();
    let err = store
        .get_chunk_refs("7", 0, 1, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unimplemented { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scan_counts_orgs_per_segment() {
    let (store, index, _) = new_store();

    // Seed the weekly chunk table directly: rows keyed {org}/{fingerprint},
    // value holding the encoded chunk, plus one unparsable-org row.
    let mut batch = index.new_write_batch();
    for i in 0..5 {
        let c = chunk("3", "up", &format!("job-{}", i), 1000 + i, 2000 + i);
        batch.add(
            "chunks_0",
            format!("3/{:x}", c.fingerprint),
            c.external_key().into_bytes(),
            c.encoded_bytes().unwrap().to_vec(),
        );
    }
    for i in 0..2 {
        let c = chunk("8", "up", &format!("job-{}", i), 1000 + i, 2000 + i);
        batch.add(
            "chunks_0",
            format!("8/{:x}", c.fingerprint),
            c.external_key().into_bytes(),
            c.encoded_bytes().unwrap().to_vec(),
        );
    }
    batch.add("chunks_0", "-1/deadbeef".to_string(), b"r".to_vec(), b"v".to_vec());
    index.batch_write(batch).await.unwrap();

    let segments = 3;
    let handlers: Vec<Arc<ScanHandler>> = (0..segments)
        .map(|_| {
            Arc::new(ScanHandler::new(
                "chunks_0".to_string(),
                HashSet::new(),
                None,
            ))
        })
        .collect();
    let callbacks = handlers.iter().map(|h| h.page_callback()).collect();

    store.scan(1000, 1000, false, callbacks).await.unwrap();

    let mut totals = ScanSummary::default();
    for handler in &handlers {
        totals.accumulate(&handler.finish().await);
    }
    assert_eq!(totals.counts().get(&3), Some(&5));
    assert_eq!(totals.counts().get(&8), Some(&2));
    assert_eq!(totals.counts().get(&-1), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scan_reindexes_into_new_table_family() {
    let (store, index, _) = new_store();
    let reindex_schema = SchemaConfig {
        configs: vec![config::PeriodicSchemaConfig {
            index_tables: config::PeriodicTableConfig::with_prefix("reindex_"),
            ..Default::default()
        }],
    };
    let reindex_index = Arc::new(MemIndexClient::new());
    let reindex_store = Arc::new(
        ChunkStore::new(
            StoreConfig::default(),
            &reindex_schema,
            reindex_index.clone(),
            Arc::new(MemChunkClient::new()),
            Arc::new(LimitsConfig::default()),
        )
        .unwrap(),
    );

    let c = chunk("3", "up", "api", 1000, 2000);
    let mut batch = index.new_write_batch();
    batch.add(
        "chunks_0",
        format!("3/{:x}", c.fingerprint),
        c.external_key().into_bytes(),
        c.encoded_bytes().unwrap().to_vec(),
    );
    index.batch_write(batch).await.unwrap();

    let handler = Arc::new(ScanHandler::new(
        "chunks_0".to_string(),
        HashSet::new(),
        Some(reindex_store),
    ));
    store
        .scan(1000, 1000, true, vec![handler.page_callback()])
        .await
        .unwrap();
    handler.finish().await;

    assert!(reindex_index.row_count("reindex_0") > 0);
}

#[test]
fn test_org_from_hash_reexport() {
    assert_eq!(org_from_hash("42/ff"), 42);
}
