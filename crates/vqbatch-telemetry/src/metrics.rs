//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Collector registration stays private; callers only see typed increments.
//! - Counters cover the three places a batch spends effort: per-asset
//!   outcomes, backend invocations, and workfile staging operations.

use std::convert::TryFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{MetricStage, Result, TelemetryError};

/// Outcome label recorded for each asset a pipeline run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOutcome {
    /// A valid log already existed; no backend work was done.
    CacheHit,
    /// The backend ran and produced a fresh log.
    Executed,
    /// The asset could not be brought to a valid log.
    Failed,
}

impl AssetOutcome {
    /// Label value used in the exposition output.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }
}

/// Prometheus-backed metrics registry shared across the runner.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    pipeline_assets_total: IntCounterVec,
    backend_invocations_total: IntCounterVec,
    workfile_ops_total: IntCounterVec,
    last_batch_duration_ms: IntGauge,
}

/// Snapshot of selected counters for reporting and assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Assets served from an existing log.
    pub assets_cache_hit: u64,
    /// Assets that required a backend run.
    pub assets_executed: u64,
    /// Assets that failed.
    pub assets_failed: u64,
    /// Backend invocations that exited successfully.
    pub backend_success: u64,
    /// Backend invocations that failed or timed out.
    pub backend_failure: u64,
    /// Wall-clock duration of the most recent batch (ms).
    pub last_batch_duration_ms: i64,
}

impl MetricsSnapshot {
    /// Total backend invocations regardless of status.
    #[must_use]
    pub const fn backend_invocations(&self) -> u64 {
        self.backend_success + self.backend_failure
    }
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pipeline_assets_total = counter_vec(
            "pipeline_assets_total",
            "Assets processed by the execution pipeline by outcome",
            &["outcome"],
        )?;
        let backend_invocations_total = counter_vec(
            "backend_invocations_total",
            "Quality backend invocations by status",
            &["status"],
        )?;
        let workfile_ops_total = counter_vec(
            "workfile_ops_total",
            "Workfile staging operations by kind and status",
            &["op", "status"],
        )?;
        let last_batch_duration_ms = IntGauge::with_opts(Opts::new(
            "last_batch_duration_ms",
            "Wall-clock duration of the most recent batch (ms)",
        ))
        .map_err(|source| TelemetryError::Metric {
            name: "last_batch_duration_ms",
            stage: MetricStage::Build,
            source,
        })?;

        register(&registry, "pipeline_assets_total", &pipeline_assets_total)?;
        register(
            &registry,
            "backend_invocations_total",
            &backend_invocations_total,
        )?;
        register(&registry, "workfile_ops_total", &workfile_ops_total)?;
        register(&registry, "last_batch_duration_ms", &last_batch_duration_ms)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                pipeline_assets_total,
                backend_invocations_total,
                workfile_ops_total,
                last_batch_duration_ms,
            }),
        })
    }

    /// Increment the per-asset outcome counter.
    pub fn inc_pipeline_asset(&self, outcome: AssetOutcome) {
        self.inner
            .pipeline_assets_total
            .with_label_values(&[outcome.as_label()])
            .inc();
    }

    /// Increment the backend invocation counter.
    pub fn inc_backend_invocation(&self, status: &str) {
        self.inner
            .backend_invocations_total
            .with_label_values(&[status])
            .inc();
    }

    /// Increment the workfile operation counter.
    pub fn inc_workfile_op(&self, op: &str, status: &str) {
        self.inner
            .workfile_ops_total
            .with_label_values(&[op, status])
            .inc();
    }

    /// Record the wall-clock duration of a finished batch.
    pub fn observe_batch_duration(&self, duration: Duration) {
        self.inner
            .last_batch_duration_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Encode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::Utf8 { source })
    }

    /// Render the registry and write it to `path`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        std::fs::write(path, rendered).map_err(|source| TelemetryError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Take a point-in-time snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let assets = &self.inner.pipeline_assets_total;
        let backend = &self.inner.backend_invocations_total;
        MetricsSnapshot {
            assets_cache_hit: assets
                .with_label_values(&[AssetOutcome::CacheHit.as_label()])
                .get(),
            assets_executed: assets
                .with_label_values(&[AssetOutcome::Executed.as_label()])
                .get(),
            assets_failed: assets
                .with_label_values(&[AssetOutcome::Failed.as_label()])
                .get(),
            backend_success: backend.with_label_values(&["success"]).get(),
            backend_failure: backend.with_label_values(&["failure"]).get()
                + backend.with_label_values(&["timeout"]).get(),
            last_batch_duration_ms: self.inner.last_batch_duration_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::Metric {
            name,
            stage: MetricStage::Build,
            source,
        })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Metric {
            name,
            stage: MetricStage::Register,
            source,
        })
}
