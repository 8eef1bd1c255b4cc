use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

use crate::errors::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "crowd_readings_total",
        "Total readings accepted from devices"
    ))
    .unwrap();
    pub static ref SHOP_UPDATES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "crowd_shop_updates_total",
        "Total crowd count overwrites on linked shops"
    ))
    .unwrap();
    pub static ref UNLINKED_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "crowd_unlinked_readings_total",
        "Total readings from devices without a shop"
    ))
    .unwrap();
    pub static ref STATUS_QUERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "crowd_status_queries_total",
        "Total successful device status queries"
    ))
    .unwrap();
    pub static ref REJECTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "crowd_rejected_requests_total",
            "Total requests rejected, by endpoint and reason"
        ),
        &["endpoint", "reason"]
    )
    .unwrap();
    pub static ref REQUEST_LATENCY_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "crowd_request_latency_seconds",
            "Time spent handling device requests"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ]),
        &["endpoint"]
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SHOP_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNLINKED_READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn record_rejection(endpoint: &str, err: &Error) {
    REJECTED_TOTAL
        .with_label_values(&[endpoint, err.kind()])
        .inc();
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Internal(format!("Metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics not UTF-8: {}", e)))
}
