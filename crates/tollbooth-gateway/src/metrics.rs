use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Request counters
pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_requests_total", "Total number of requests"),
        &["method", "status"],
    )
    .unwrap()
});

// Payment counters
pub static PAYMENTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_payments_total",
        "Total number of successful payments",
    )
    .unwrap()
});

pub static PAYMENTS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("gateway_payments_failed", "Total number of failed payments").unwrap()
});

/// Origin was called but the payment could not be captured. Every increment
/// here is revenue that needs manual reconciliation.
pub static SETTLEMENT_FAILED_AFTER_DELIVERY: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_settlement_failed_after_delivery_total",
        "Settlements that failed after the origin response was already delivered",
    )
    .unwrap()
});

// Endpoint counters
pub static ENDPOINTS_REGISTERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_endpoints_registered",
        "Total number of endpoints registered",
    )
    .unwrap()
});

// Forwarding metrics
pub static FORWARD_REQUESTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_forward_requests_total",
        "Total number of origin forwards",
    )
    .unwrap()
});

pub static FORWARD_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("gateway_forward_latency_seconds", "Origin request latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap()
});

// Per-endpoint counters
pub static ENDPOINT_PAYMENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_endpoint_payments_total",
            "Successful payments per endpoint",
        ),
        &["provider"],
    )
    .unwrap()
});

pub static ENDPOINT_REVENUE: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_endpoint_revenue_total",
            "Revenue in atomic token units per endpoint",
        ),
        &["provider"],
    )
    .unwrap()
});

/// Register all metrics with the registry
pub fn register_metrics() {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(PAYMENTS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(PAYMENTS_FAILED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(SETTLEMENT_FAILED_AFTER_DELIVERY.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ENDPOINTS_REGISTERED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(FORWARD_REQUESTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(FORWARD_LATENCY.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ENDPOINT_PAYMENTS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ENDPOINT_REVENUE.clone()))
        .unwrap();
}
