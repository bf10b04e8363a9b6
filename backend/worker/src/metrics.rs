//! Worker-local Prometheus registry (spec.md §4.J/§4.L throughput and
//! duration reporting, supplemented per SPEC_FULL §4.5): there is no HTTP
//! front door to scrape from, so the registry is gathered into a text
//! exposition and logged periodically instead of served.

use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

pub struct WorkerMetrics {
    registry: Registry,
    jobs_total: IntCounterVec,
    job_duration_seconds: HistogramVec,
}

impl WorkerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("worker_jobs_total", "job handler invocations by job name and outcome"),
            &["job_name", "outcome"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;

        let job_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("worker_job_duration_seconds", "job handler wall time"),
            &["job_name"],
        )?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        Ok(Self { registry, jobs_total, job_duration_seconds })
    }

    pub fn record(&self, job_name: &str, outcome: &str, duration: std::time::Duration) {
        self.jobs_total.with_label_values(&[job_name, outcome]).inc();
        self.job_duration_seconds.with_label_values(&[job_name]).observe(duration.as_secs_f64());
    }

    /// Text exposition format, the same shape an HTTP exporter would serve;
    /// here it just goes to the log.
    pub fn render_text(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
            warn!(error = %e, "failed to render worker metrics");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
