use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, gather, register_histogram, register_int_counter,
    register_int_counter_vec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
};
use tracing::error;

pub const NAMESPACE: &str = "cortex";

pub static INDEX_ENTRIES_PER_CHUNK: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(HistogramOpts::new(
        "chunk_store_index_entries_per_chunk",
        "Number of entries written to storage per chunk.",
    )
    .namespace(NAMESPACE)
    .buckets(exponential_buckets(1.0, 2.0, 5).unwrap()))
    .expect("chunk store metric cannot be created")
});

pub static CACHE_CORRUPT_CHUNKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(Opts::new(
        "cache_corrupt_chunks_total",
        "Total count of corrupt chunks found in cache.",
    )
    .namespace(NAMESPACE))
    .expect("cache metric cannot be created")
});

pub static PAGES_SCANNED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        Opts::new(
            "pages_scanned_total",
            "Total count of pages scanned from a table",
        )
        .namespace(NAMESPACE),
        &["table"]
    )
    .expect("scan metric cannot be created")
});

/// Text exposition of the default registry.
pub fn gather_metrics() -> Vec<u8> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Some(e) = encoder.encode(gather().as_ref(), &mut buffer).err() {
        error!("could not encode metrics: {}", e)
    }
    buffer
}
