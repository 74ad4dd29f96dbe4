//! Prometheus metrics for admission handling

use anyhow::Result;
use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

use crate::admission::Outcome;

/// Prometheus metrics collector for admission reviews
#[derive(Clone)]
pub struct AdmissionMetrics {
    /// Admission reviews by outcome
    pub admission_requests_total: CounterVec,
    /// Patch computation failures by error kind
    pub admission_errors_total: CounterVec,
    /// Time spent answering an admission review
    pub admission_duration_seconds: Histogram,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl AdmissionMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let admission_requests_total = CounterVec::new(
            Opts::new("admission_requests_total", "Total admission reviews by outcome"),
            &["outcome"],
        )?;

        let admission_errors_total = CounterVec::new(
            Opts::new("admission_errors_total", "Total patch computation errors by kind"),
            &["kind"],
        )?;

        let admission_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "admission_duration_seconds",
            "Admission review latency in seconds",
        ))?;

        registry.register(Box::new(admission_requests_total.clone()))?;
        registry.register(Box::new(admission_errors_total.clone()))?;
        registry.register(Box::new(admission_duration_seconds.clone()))?;

        Ok(Self {
            admission_requests_total,
            admission_errors_total,
            admission_duration_seconds,
            registry,
        })
    }

    pub fn observe(&self, outcome: Outcome, elapsed: Duration) {
        self.admission_requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.admission_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn observe_error(&self, kind: &str) {
        self.admission_errors_total.with_label_values(&[kind]).inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
