//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Collector registration stays private; callers use typed increment helpers.
//! - Transfer outcomes are labelled with a closed set of values.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Terminal state of a transfer, used as the `outcome` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Transfer record written.
    Completed,
    /// Job failed with an error.
    Failed,
    /// Owner cancelled the job.
    Cancelled,
}

impl Outcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Metrics registry shared across a process.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    transfers_total: IntCounterVec,
    http_requests_total: IntCounterVec,
    active_jobs: IntGauge,
    progress_write_failures_total: IntCounter,
}

/// Point-in-time view of the process gauges and counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs currently executing in this process.
    pub active_jobs: i64,
    /// Progress writes that failed and were dropped.
    pub progress_write_failures_total: u64,
}

impl Metrics {
    /// Construct a registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let transfers_total = IntCounterVec::new(
            Opts::new("transfers_total", "Finished transfers by route and outcome"),
            &["route", "outcome"],
        )
        .map_err(TelemetryError::register("transfers_total"))?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests served"),
            &["route", "code"],
        )
        .map_err(TelemetryError::register("http_requests_total"))?;
        let active_jobs = IntGauge::with_opts(Opts::new(
            "active_jobs",
            "Jobs currently executing in this process",
        ))
        .map_err(TelemetryError::register("active_jobs"))?;
        let progress_write_failures_total = IntCounter::with_opts(Opts::new(
            "progress_write_failures_total",
            "Progress writes that failed and were dropped",
        ))
        .map_err(TelemetryError::register("progress_write_failures_total"))?;

        registry
            .register(Box::new(transfers_total.clone()))
            .map_err(TelemetryError::register("transfers_total"))?;
        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(TelemetryError::register("http_requests_total"))?;
        registry
            .register(Box::new(active_jobs.clone()))
            .map_err(TelemetryError::register("active_jobs"))?;
        registry
            .register(Box::new(progress_write_failures_total.clone()))
            .map_err(TelemetryError::register("progress_write_failures_total"))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                transfers_total,
                http_requests_total,
                active_jobs,
                progress_write_failures_total,
            }),
        })
    }

    /// Count a finished transfer.
    pub fn inc_transfer(&self, route: &str, outcome: Outcome) {
        self.inner
            .transfers_total
            .with_label_values(&[route, outcome.as_str()])
            .inc();
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Mark a job as started in this process.
    pub fn job_started(&self) {
        self.inner.active_jobs.inc();
    }

    /// Mark a job as finished in this process.
    pub fn job_finished(&self) {
        self.inner.active_jobs.dec();
    }

    /// Count a dropped progress write.
    pub fn inc_progress_write_failure(&self) {
        self.inner.progress_write_failures_total.inc();
    }

    /// Transfers counted for a route and outcome.
    #[must_use]
    pub fn transfers(&self, route: &str, outcome: Outcome) -> u64 {
        self.inner
            .transfers_total
            .with_label_values(&[route, outcome.as_str()])
            .get()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Snapshot of the process gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_jobs: self.inner.active_jobs.get(),
            progress_write_failures_total: self.inner.progress_write_failures_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_rendered_output() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_transfer("gdrive-to-mega", Outcome::Completed);
        metrics.inc_transfer("gdrive-to-mega", Outcome::Completed);
        metrics.inc_transfer("mega-to-gdrive", Outcome::Cancelled);
        metrics.inc_http_request("/api/file/{file_id}", 404);
        metrics.job_started();
        metrics.job_started();
        metrics.job_finished();
        metrics.inc_progress_write_failure();

        assert_eq!(metrics.transfers("gdrive-to-mega", Outcome::Completed), 2);
        assert_eq!(metrics.transfers("gdrive-to-mega", Outcome::Failed), 0);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_jobs, 1);
        assert_eq!(snapshot.progress_write_failures_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("transfers_total"));
        assert!(rendered.contains("outcome=\"cancelled\""));
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("active_jobs 1"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> anyhow::Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_progress_write_failure();
        assert_eq!(second.snapshot().progress_write_failures_total, 0);
        Ok(())
    }
}
