//! Prometheus-backed pipeline metrics.
//!
//! A [`MetricsRegistry`] owns a Prometheus registry and a set of
//! strongly-typed pipeline metrics. The text rendering can be served by any
//! exporter or written to a node-exporter textfile collector directory.

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Pipeline-related Prometheus metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    /// End-to-end ingest latency (fingerprint, upload, anchor, persist).
    pub ingest_seconds: Histogram,
    /// End-to-end verification latency.
    pub verify_seconds: Histogram,
    /// Ingest attempts by outcome (`anchored`, `upload_failed`, ...).
    pub ingests_total: IntCounterVec,
    /// Verification attempts by outcome (`verified`, `tampered`, ...).
    pub verifications_total: IntCounterVec,
    /// Pin requests that failed after a successful anchor.
    pub pin_failures_total: IntCounter,
}

impl PipelineMetrics {
    /// Registers pipeline metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        // Ledger confirmation dominates ingest, so the buckets reach further
        // than the verification ones.
        let ingest_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "pipeline_ingest_seconds",
                "Time to fingerprint, upload, anchor and catalogue one evidence item",
            )
            .buckets(vec![
                0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
            ]),
        )?;
        registry.register(Box::new(ingest_seconds.clone()))?;

        let verify_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "pipeline_verify_seconds",
                "Time to retrieve, re-fingerprint and reconcile one evidence item",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )?;
        registry.register(Box::new(verify_seconds.clone()))?;

        let ingests_total = IntCounterVec::new(
            Opts::new("pipeline_ingests_total", "Ingest attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ingests_total.clone()))?;

        let verifications_total = IntCounterVec::new(
            Opts::new(
                "pipeline_verifications_total",
                "Verification attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(verifications_total.clone()))?;

        let pin_failures_total = IntCounter::with_opts(Opts::new(
            "pipeline_pin_failures_total",
            "Pin requests that failed after evidence was anchored",
        ))?;
        registry.register(Box::new(pin_failures_total.clone()))?;

        Ok(Self {
            ingest_seconds,
            verify_seconds,
            ingests_total,
            verifications_total,
            pin_failures_total,
        })
    }
}

/// Wrapper around a Prometheus registry and the pipeline metrics.
///
/// This is the handle passed to the coordinator. It can be wrapped in an
/// [`std::sync::Arc`] and shared across threads.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub pipeline: PipelineMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh `custody`-prefixed
    /// registry and registers the pipeline metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("custody".to_string()), None)?;
        let pipeline = PipelineMetrics::register(&registry)?;
        Ok(Self { registry, pipeline })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn pipeline_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = PipelineMetrics::register(&registry).expect("register metrics");

        metrics.ingest_seconds.observe(0.4);
        metrics.verify_seconds.observe(0.02);
        metrics.ingests_total.with_label_values(&["anchored"]).inc();
        metrics.verifications_total.with_label_values(&["tampered"]).inc();
        metrics.pin_failures_total.inc();

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_is_prefixed() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry
            .pipeline
            .verifications_total
            .with_label_values(&["verified"])
            .inc();
        let text = registry.gather_text();
        assert!(text.contains("custody_pipeline_verifications_total"));
        assert!(text.contains("outcome=\"verified\""));
    }
}
