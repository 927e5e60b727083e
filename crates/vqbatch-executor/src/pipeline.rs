//! The asset execution pipeline.
//!
//! # Design
//! - Batch-level checks (distinct identities, distinct log paths) run before
//!   any asset is touched; a violation aborts the whole batch.
//! - Each asset then goes through ensure-log: shape check, cache lookup, and on
//!   a miss stage, invoke, release, commit and unstage. A failure stays local
//!   to its asset and always leaves the final log path empty.
//! - Results are derived in a second pass, in input order, only after every
//!   ensure-log step has finished.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vqbatch_config::PipelineSettings;
use vqbatch_telemetry::{AssetOutcome as OutcomeLabel, Metrics};
use vqbatch_workfile::{StagingMode, WorkfilePlan, WorkfileStager};

use crate::asset::Asset;
use crate::backend::{Backend, BackendRequest};
use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::ExecutorIdentity;
use crate::log_cache::{CacheStatus, LogCache};
use crate::report::{AssetCacheStatus, AssetFailure, BatchReport};
use crate::result::AssetResult;

/// A log that is known to exist after ensure-log.
#[derive(Debug)]
struct EnsuredLog {
    path: PathBuf,
    cached: bool,
}

/// Runs a backend over batches of assets with on-disk result caching.
pub struct ExecutionPipeline {
    backend: Arc<dyn Backend>,
    settings: PipelineSettings,
    cache: LogCache,
    stager: WorkfileStager,
    metrics: Metrics,
}

impl ExecutionPipeline {
    /// Wire a pipeline from its backend, settings and metrics registry.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, settings: PipelineSettings, metrics: Metrics) -> Self {
        let cache = LogCache::new(settings.log_file_dir.clone());
        let stager = WorkfileStager::new(
            StagingMode::from_fifo_flag(settings.fifo_mode),
            metrics.clone(),
        );
        Self {
            backend,
            settings,
            cache,
            stager,
            metrics,
        }
    }

    /// Identity of the backend.
    #[must_use]
    pub fn identity(&self) -> &ExecutorIdentity {
        self.backend.identity()
    }

    /// `{type}_V{version}` of the backend.
    #[must_use]
    pub fn executor_id(&self) -> String {
        self.identity().id()
    }

    /// Settings the pipeline was built with.
    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Log cache backing this pipeline.
    #[must_use]
    pub const fn log_cache(&self) -> &LogCache {
        &self.cache
    }

    /// Final log path for `asset`.
    #[must_use]
    pub fn log_path(&self, asset: &Asset) -> PathBuf {
        self.cache.path_for(self.identity(), asset)
    }

    /// Workfile paths for `asset`:
    /// `{workdir_root}/{executor_id}/{asset_string}/{ref,dis}_{file_name}`.
    #[must_use]
    pub fn workfile_plan(&self, asset: &Asset) -> WorkfilePlan {
        let dir = self
            .settings
            .workdir_root
            .join(self.executor_id())
            .join(asset.identity_string());
        WorkfilePlan::new(
            asset.reference_path.clone(),
            asset.distorted_path.clone(),
            dir.join(format!("ref_{}", asset.reference_file_name())),
            dir.join(format!("dis_{}", asset.distorted_file_name())),
        )
    }

    /// Ensure a log exists for every asset, then derive results in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::DuplicateAsset`] or
    /// [`ExecutorError::PathCollision`] before any work starts. Per-asset
    /// failures are reported inside the [`BatchReport`].
    pub async fn run(&self, assets: &[Asset]) -> ExecutorResult<BatchReport> {
        self.check_batch(assets)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let executor_id = self.executor_id();
        let concurrency = self.settings.max_concurrency.max(1);
        info!(
            %run_id,
            executor = %executor_id,
            assets = assets.len(),
            fifo_mode = self.settings.fifo_mode,
            concurrency,
            "starting batch"
        );

        let ensured: Vec<ExecutorResult<EnsuredLog>> = stream::iter(assets)
            .map(|asset| self.ensure_log(asset))
            .buffered(concurrency)
            .collect()
            .await;

        let outcomes: Vec<Result<AssetResult, AssetFailure>> = assets
            .iter()
            .zip(ensured)
            .map(|(asset, ensured)| {
                let derived = ensured.and_then(|log| {
                    let result = self.derive_result(asset, &log.path)?;
                    Ok((result, log.cached))
                });
                match derived {
                    Ok((result, cached)) => {
                        self.metrics.inc_pipeline_asset(if cached {
                            OutcomeLabel::CacheHit
                        } else {
                            OutcomeLabel::Executed
                        });
                        Ok(result)
                    }
                    Err(error) => {
                        self.metrics.inc_pipeline_asset(OutcomeLabel::Failed);
                        warn!(
                            %run_id,
                            key = %asset.key(),
                            kind = error.kind(),
                            error = %error.detail(),
                            "asset failed"
                        );
                        Err(AssetFailure {
                            key: asset.key(),
                            error,
                        })
                    }
                }
            })
            .collect();

        let report = BatchReport {
            run_id,
            executor_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        self.metrics.observe_batch_duration(clock.elapsed());
        info!(
            %run_id,
            succeeded = report.outcomes.len() - report.failed_count(),
            failed = report.failed_count(),
            elapsed_ms = clock.elapsed().as_millis(),
            "batch finished"
        );
        Ok(report)
    }

    /// Report whether a finished log exists for each asset, without running
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing log cannot be read.
    pub fn cache_status(&self, assets: &[Asset]) -> ExecutorResult<Vec<AssetCacheStatus>> {
        assets
            .iter()
            .map(|asset| {
                Ok(AssetCacheStatus {
                    key: asset.key(),
                    status: self.cache.lookup(self.identity(), asset)?,
                })
            })
            .collect()
    }

    /// Delete the log of every asset; returns how many logs were removed.
    ///
    /// # Errors
    ///
    /// Returns an error for any removal failure other than not-found.
    pub fn remove_logs(&self, assets: &[Asset]) -> ExecutorResult<usize> {
        let mut removed = 0;
        for asset in assets {
            if self.cache.remove(self.identity(), asset)? {
                debug!(key = %asset.key(), "removed log");
                removed += 1;
            }
        }
        info!(removed, requested = assets.len(), "removed cached logs");
        Ok(removed)
    }

    fn check_batch(&self, assets: &[Asset]) -> ExecutorResult<()> {
        let mut keys = HashSet::with_capacity(assets.len());
        for asset in assets {
            let key = asset.key();
            if !keys.insert(key.clone()) {
                return Err(ExecutorError::DuplicateAsset { key });
            }
        }

        let mut paths: HashMap<PathBuf, &Asset> = HashMap::with_capacity(assets.len());
        for asset in assets {
            let path = self.log_path(asset);
            if let Some(first) = paths.insert(path.clone(), asset) {
                return Err(ExecutorError::PathCollision {
                    first: first.key(),
                    second: asset.key(),
                    path,
                });
            }
        }
        Ok(())
    }

    async fn ensure_log(&self, asset: &Asset) -> ExecutorResult<EnsuredLog> {
        asset.validate()?;

        match self.cache.lookup(self.identity(), asset)? {
            CacheStatus::Hit { path } => {
                info!(
                    key = %asset.key(),
                    log = %path.display(),
                    "log exists, skipping backend run"
                );
                return Ok(EnsuredLog { path, cached: true });
            }
            CacheStatus::Stale { path, found } => {
                warn!(
                    key = %asset.key(),
                    log = %path.display(),
                    found = %found,
                    "log belongs to another executor, regenerating"
                );
            }
            CacheStatus::Missing { .. } => {}
        }

        let plan = self.workfile_plan(asset);
        self.stager.clear(&plan)?;
        let produced = self.produce_log(asset, &plan).await;

        let cleanup = match &produced {
            Ok(_) if !self.settings.delete_workdir => Ok(()),
            Ok(_) => self.stager.unstage(&plan, true),
            Err(_) => self.stager.unstage(&plan, self.settings.delete_workdir),
        };
        match (produced, cleanup) {
            (Ok(path), Ok(())) => Ok(EnsuredLog {
                path,
                cached: false,
            }),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                warn!(
                    key = %asset.key(),
                    error = %cleanup_err,
                    "failed to clean up workfiles after asset failure"
                );
                Err(err)
            }
        }
    }

    /// Stage, invoke and commit. The pending log is dropped (and removed) on
    /// every error path, so the final path only ever holds finished logs.
    async fn produce_log(&self, asset: &Asset, plan: &WorkfilePlan) -> ExecutorResult<PathBuf> {
        let pending = self.cache.begin(self.identity(), asset)?;
        let staged = self.stager.stage(plan).await?;

        let invoked = self.invoke_backend(asset, plan, pending.path()).await;
        let released = staged.release().await;
        invoked?;
        let report = released?;
        if !report.is_complete() {
            warn!(
                key = %asset.key(),
                "backend stopped reading a workfile before its end"
            );
        }

        let path = pending.commit()?;
        info!(key = %asset.key(), log = %path.display(), "backend run finished");
        Ok(path)
    }

    async fn invoke_backend(
        &self,
        asset: &Asset,
        plan: &WorkfilePlan,
        log_path: &Path,
    ) -> ExecutorResult<()> {
        let request = BackendRequest {
            asset,
            reference_workfile: &plan.reference_workfile,
            distorted_workfile: &plan.distorted_workfile,
            log_path,
        };
        let clock = Instant::now();
        let call = self.backend.invoke(&request);
        let result = match self.settings.backend_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .unwrap_or(Err(ExecutorError::BackendTimeout { timeout })),
            None => call.await,
        };

        let status = match &result {
            Ok(()) => "success",
            Err(ExecutorError::BackendTimeout { .. }) => "timeout",
            Err(_) => "failure",
        };
        self.metrics.inc_backend_invocation(status);
        debug!(
            key = %asset.key(),
            executor = %self.identity(),
            status,
            elapsed_ms = clock.elapsed().as_millis(),
            "backend invocation finished"
        );
        result
    }

    fn derive_result(&self, asset: &Asset, log_path: &Path) -> ExecutorResult<AssetResult> {
        let log = self.cache.read(log_path)?;
        self.backend.parse_result(asset, &log)
    }
}
