//! Command handlers grouped by concern.

mod logs;
mod run;

use std::sync::Arc;

use anyhow::Result;
use vqbatch_config::RunnerConfig;
use vqbatch_executor::{CommandBackend, ExecutionPipeline};
use vqbatch_telemetry::Metrics;

pub(crate) use logs::{handle_remove_logs, handle_status};
pub(crate) use run::handle_run;

/// Everything a command needs, wired from one configuration document.
pub(crate) struct AppContext {
    pub(crate) config: RunnerConfig,
    pub(crate) pipeline: ExecutionPipeline,
    pub(crate) metrics: Metrics,
}

impl AppContext {
    pub(crate) fn from_config(config: RunnerConfig) -> Result<Self> {
        let metrics = Metrics::new()?;
        let backend = CommandBackend::from_settings(&config.backend)?;
        let pipeline = ExecutionPipeline::new(
            Arc::new(backend),
            config.pipeline.clone(),
            metrics.clone(),
        );
        Ok(Self {
            config,
            pipeline,
            metrics,
        })
    }

    /// Write the metrics exposition file when one is configured.
    pub(crate) fn write_metrics(&self) -> Result<()> {
        if let Some(path) = &self.config.telemetry.metrics_path {
            self.metrics.write_to(path)?;
        }
        Ok(())
    }
}
