//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_counter_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Completion service metrics
    pub completion_requests: CounterVec,
    pub completion_duration: HistogramVec,

    // Context window metrics
    pub context_compressions: CounterVec,
    pub context_tokens_removed: Histogram,
    pub context_occupancy: Histogram,

    // Turn metrics
    pub turns_completed: Counter,
    pub turn_cost: Histogram,
    pub session_conflicts: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let completion_requests = register_counter_vec_with_registry!(
            Opts::new("completion_requests_total", "Total completion service requests"),
            &["purpose", "status"],
            registry
        )?;

        let completion_duration = register_histogram_vec_with_registry!(
            "completion_duration_seconds",
            "Completion service request duration in seconds",
            &["purpose"],
            registry
        )?;

        let context_compressions = register_counter_vec_with_registry!(
            Opts::new("context_compressions_total", "Total history compression attempts"),
            &["status"],
            registry
        )?;

        let context_tokens_removed = register_histogram_with_registry!(
            HistogramOpts::new("context_tokens_removed", "Estimated tokens removed per compression")
                .buckets(vec![1000.0, 5000.0, 10000.0, 25000.0, 50000.0, 100000.0]),
            registry
        )?;

        let context_occupancy = register_histogram_with_registry!(
            HistogramOpts::new("context_occupancy_ratio", "Projected context occupancy per turn")
                .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
            registry
        )?;

        let turns_completed = register_counter_with_registry!(
            Opts::new("turns_completed_total", "Total narrative turns completed"),
            registry
        )?;

        let turn_cost = register_histogram_with_registry!(
            HistogramOpts::new("turn_cost_usd", "Completion cost per narrative turn in USD")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
            registry
        )?;

        let session_conflicts = register_counter_with_registry!(
            Opts::new("session_conflicts_total", "Turns rejected because the session was busy"),
            registry
        )?;

        Ok(Self {
            registry,
            completion_requests,
            completion_duration,
            context_compressions,
            context_tokens_removed,
            context_occupancy,
            turns_completed,
            turn_cost,
            session_conflicts,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completion service request
    pub fn record_completion(&self, purpose: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.completion_requests.with_label_values(&[purpose, status]).inc();
    }

    /// Record a compression attempt
    pub fn record_compression(&self, success: bool, tokens_removed: i64) {
        let status = if success { "success" } else { "error" };
        self.context_compressions.with_label_values(&[status]).inc();
        if success {
            self.context_tokens_removed.observe(tokens_removed.max(0) as f64);
        }
    }

    /// Record projected occupancy for a turn
    pub fn record_occupancy(&self, occupancy: f64) {
        self.context_occupancy.observe(occupancy);
    }

    /// Record a completed narrative turn
    pub fn record_turn(&self, total_cost: f64) {
        self.turns_completed.inc();
        self.turn_cost.observe(total_cost);
    }

    pub fn record_session_conflict(&self) {
        self.session_conflicts.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
