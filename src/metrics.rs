//! Ambient observability: a small `prometheus`
//! registry tracking decision outcomes, computed complexity, and
//! end-to-end decision latency, alongside `tracing` spans for structured
//! logs. Constructed once per [`crate::gateway::Gateway`] and shared via
//! `Arc` — there is no process-wide static registry to reach for.

use once_cell::sync::Lazy;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;

static COMPLEXITY_BUCKETS: Lazy<Vec<f64>> =
    Lazy::new(|| vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0]);

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    complexity: HistogramVec,
    decision_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("costgate_requests_total", "Total gateway decisions by outcome"),
            &["outcome"],
        )
        .expect("static metric options are valid");
        let complexity = HistogramVec::new(
            HistogramOpts::new("costgate_complexity", "Computed operation complexity").buckets(COMPLEXITY_BUCKETS.clone()),
            &[],
        )
        .expect("static metric options are valid");
        let decision_seconds = HistogramVec::new(
            HistogramOpts::new("costgate_decision_seconds", "Time spent producing a rate-limit decision"),
            &[],
        )
        .expect("static metric options are valid");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("metric is only registered once");
        registry
            .register(Box::new(complexity.clone()))
            .expect("metric is only registered once");
        registry
            .register(Box::new(decision_seconds.clone()))
            .expect("metric is only registered once");

        Metrics {
            registry,
            requests_total,
            complexity,
            decision_seconds,
        }
    }

    pub fn record(&self, outcome: &str, complexity: u64, decision_seconds: f64) {
        self.requests_total.with_label_values(&[outcome]).inc();
        self.complexity.with_label_values(&[]).observe(complexity as f64);
        self.decision_seconds.with_label_values(&[]).observe(decision_seconds);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_panicking() {
        let metrics = Metrics::new();
        metrics.record("allowed", 12, 0.001);
        metrics.record("denied", 500, 0.002);
        assert!(!metrics.registry().gather().is_empty());
    }
}
