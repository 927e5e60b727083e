//! Batch reports.
//!
//! # Design
//! - One outcome per input asset, in input order.
//! - Failures keep the typed error; [`BatchSummary`] is the serialisable view.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::asset::AssetKey;
use crate::error::{ExecutorError, ExecutorResult};
use crate::log_cache::CacheStatus;
use crate::result::AssetResult;

/// An asset that could not be brought to a result.
#[derive(Debug)]
pub struct AssetFailure {
    /// Asset that failed.
    pub key: AssetKey,
    /// Why it failed.
    pub error: ExecutorError,
}

/// Per-asset outcome of a batch.
pub type AssetOutcome = Result<AssetResult, AssetFailure>;

/// Outcome of one [`crate::ExecutionPipeline::run`] call.
#[derive(Debug)]
pub struct BatchReport {
    /// Unique id of this run, echoed in logs.
    pub run_id: Uuid,
    /// Executor id the batch ran under.
    pub executor_id: String,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// When the last result was derived.
    pub finished_at: DateTime<Utc>,
    /// One entry per input asset, in input order.
    pub outcomes: Vec<AssetOutcome>,
}

impl BatchReport {
    /// Successful results in input order.
    pub fn results(&self) -> impl Iterator<Item = &AssetResult> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().ok())
    }

    /// Failures in input order.
    pub fn failures(&self) -> impl Iterator<Item = &AssetFailure> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().err())
    }

    /// Number of failed assets.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Whether every asset produced a result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    /// All results, or [`ExecutorError::BatchFailed`] if any asset failed.
    ///
    /// # Errors
    ///
    /// Returns an error when at least one asset failed.
    pub fn into_results(self) -> ExecutorResult<Vec<AssetResult>> {
        let total = self.outcomes.len();
        let failed = self.failed_count();
        if failed > 0 {
            return Err(ExecutorError::BatchFailed { failed, total });
        }
        Ok(self.outcomes.into_iter().filter_map(Result::ok).collect())
    }

    /// Serialisable summary of the batch.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let outcomes: Vec<OutcomeSummary> = self
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                Ok(result) => OutcomeSummary::Succeeded {
                    key: result.key.clone(),
                    log_path: result.log_path.clone(),
                    means: result
                        .metrics()
                        .filter_map(|metric| Some((metric.to_string(), result.mean(metric)?)))
                        .collect(),
                },
                Err(failure) => OutcomeSummary::Failed {
                    key: failure.key.clone(),
                    kind: failure.error.kind(),
                    error: failure.error.detail(),
                },
            })
            .collect();
        let failed = self.failed_count();
        BatchSummary {
            run_id: self.run_id,
            executor_id: self.executor_id.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            succeeded: outcomes.len() - failed,
            failed,
            outcomes,
        }
    }
}

/// JSON-friendly view of a [`BatchReport`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Executor id the batch ran under.
    pub executor_id: String,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// When the batch finished.
    pub finished_at: DateTime<Utc>,
    /// Assets with a result.
    pub succeeded: usize,
    /// Assets without a result.
    pub failed: usize,
    /// Per-asset outcomes in input order.
    pub outcomes: Vec<OutcomeSummary>,
}

/// JSON-friendly view of one outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeSummary {
    /// The asset has a result.
    Succeeded {
        /// Asset identity.
        key: AssetKey,
        /// Log the result came from.
        log_path: PathBuf,
        /// Mean of every metric series.
        means: BTreeMap<String, f64>,
    },
    /// The asset failed.
    Failed {
        /// Asset identity.
        key: AssetKey,
        /// Error kind label.
        kind: &'static str,
        /// Error detail.
        error: String,
    },
}

/// Cache state of one asset, as reported by
/// [`crate::ExecutionPipeline::cache_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetCacheStatus {
    /// Asset identity.
    pub key: AssetKey,
    /// Cache state and log path.
    #[serde(flatten)]
    pub status: CacheStatus,
}
