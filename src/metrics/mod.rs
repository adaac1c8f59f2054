// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - RPC requests by method and outcome
// - RPC latency
// - Order transaction outcomes and committed line items
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // RPC Metrics
    pub rpc_requests_total: IntCounterVec,
    pub rpc_duration: HistogramVec,

    // Store Metrics
    pub order_transactions_total: IntCounterVec,
    pub order_line_items_total: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("order_rpc_requests_total", "Total RPC requests handled"),
            &["method", "outcome"],
        )?;
        registry.register(Box::new(rpc_requests_total.clone()))?;

        let rpc_duration = HistogramVec::new(
            HistogramOpts::new("order_rpc_duration_seconds", "RPC handling duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method"],
        )?;
        registry.register(Box::new(rpc_duration.clone()))?;

        let order_transactions_total = IntCounterVec::new(
            Opts::new("order_transactions_total", "Order creation transactions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(order_transactions_total.clone()))?;

        // No per-product label: product ids come from clients
        let order_line_items_total = IntCounter::new(
            "order_line_items_total",
            "Line items in committed orders",
        )?;
        registry.register(Box::new(order_line_items_total.clone()))?;

        Ok(Self {
            registry,
            rpc_requests_total,
            rpc_duration,
            order_transactions_total,
            order_line_items_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_rpc(&self, method: &str, outcome: &str, duration_secs: f64) {
        self.rpc_requests_total.with_label_values(&[method, outcome]).inc();
        self.rpc_duration.with_label_values(&[method]).observe(duration_secs);
    }

    pub fn record_order_transaction(&self, committed: bool) {
        let outcome = if committed { "committed" } else { "aborted" };
        self.order_transactions_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_line_items(&self, count: usize) {
        self.order_line_items_total.inc_by(count as u64);
    }
}
