use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CACHE_HITS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_cache_hits_total",
        "Total requests served from an unexpired cache entry"
    ))
    .unwrap();
    pub static ref CACHE_MISSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_cache_misses_total",
        "Total requests that triggered a live InfluxDB fetch"
    ))
    .unwrap();
    pub static ref UPSTREAM_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_upstream_failures_total",
        "Total failed InfluxDB fetch attempts"
    ))
    .unwrap();
    pub static ref STALE_SERVES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_stale_serves_total",
        "Total responses served from the last-known-good snapshot"
    ))
    .unwrap();
    pub static ref ANOMALIES_FLAGGED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_anomalies_flagged_total",
        "Total readings removed as sensor faults"
    ))
    .unwrap();
    pub static ref CSV_ROWS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_csv_rows_skipped_total",
        "Total malformed CSV rows skipped during parsing"
    ))
    .unwrap();
    pub static ref FETCH_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dashboard_fetch_latency_seconds",
            "Time taken to query and parse an InfluxDB response"
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(UPSTREAM_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STALE_SERVES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ANOMALIES_FLAGGED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CSV_ROWS_SKIPPED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(FETCH_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
