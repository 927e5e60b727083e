//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers deserialized from the runner's YAML document.
//! - Every path the pipeline touches is an explicit field; nothing is derived
//!   from process-wide state.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Complete configuration for one runner invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Execution pipeline settings.
    pub pipeline: PipelineSettings,
    /// Backend tool settings.
    pub backend: BackendSettings,
    /// Logging and metrics settings.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Settings consumed by the execution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    /// Root directory for cached log files.
    pub log_file_dir: PathBuf,
    /// Root directory for per-asset workfiles.
    pub workdir_root: PathBuf,
    /// Stage workfiles as named pipes fed by concurrent producers.
    #[serde(default = "defaults::fifo_mode")]
    pub fifo_mode: bool,
    /// Remove workfiles and their directories after each asset.
    #[serde(default = "defaults::delete_workdir")]
    pub delete_workdir: bool,
    /// Upper bound on assets processed concurrently.
    #[serde(default = "defaults::max_concurrency")]
    pub max_concurrency: usize,
    /// Optional wall-clock limit for a single backend invocation.
    #[serde(default)]
    pub backend_timeout_secs: Option<u64>,
}

impl PipelineSettings {
    /// Build settings for the given directories with every optional field at its default.
    #[must_use]
    pub fn new(log_file_dir: impl Into<PathBuf>, workdir_root: impl Into<PathBuf>) -> Self {
        Self {
            log_file_dir: log_file_dir.into(),
            workdir_root: workdir_root.into(),
            fifo_mode: defaults::FIFO_MODE,
            delete_workdir: defaults::DELETE_WORKDIR,
            max_concurrency: defaults::MAX_CONCURRENCY,
            backend_timeout_secs: None,
        }
    }

    /// Toggle named-pipe staging.
    #[must_use]
    pub const fn with_fifo_mode(mut self, enabled: bool) -> Self {
        self.fifo_mode = enabled;
        self
    }

    /// Toggle workfile removal after each asset.
    #[must_use]
    pub const fn with_delete_workdir(mut self, enabled: bool) -> Self {
        self.delete_workdir = enabled;
        self
    }

    /// Set the cross-asset concurrency bound.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Set the backend timeout in seconds.
    #[must_use]
    pub const fn with_backend_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.backend_timeout_secs = secs;
        self
    }

    /// Backend timeout as a [`Duration`], if configured.
    #[must_use]
    pub fn backend_timeout(&self) -> Option<Duration> {
        self.backend_timeout_secs.map(Duration::from_secs)
    }
}

/// External backend tool description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendSettings {
    /// Executor type recorded in log paths and headers (for example `VMAF`).
    pub executor_type: String,
    /// Executor version recorded in log paths and headers.
    pub executor_version: String,
    /// Program to execute.
    pub program: PathBuf,
    /// Argument template; `{ref}`, `{dis}`, `{log}`, `{width}`, `{height}`
    /// and `{asset}` are substituted per asset.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Logging and metrics output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// `pretty` or `json`; inferred from the build profile when absent.
    #[serde(default)]
    pub log_format: Option<String>,
    /// Where to write the Prometheus text exposition after a run.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            log_format: None,
            metrics_path: None,
        }
    }
}
