use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use vqbatch_config::PipelineSettings;
use vqbatch_executor::{
    Asset, Backend, CacheStatus, Dimensions, ExecutionPipeline, ExecutorError, OutcomeSummary,
};
use vqbatch_telemetry::Metrics;
use vqbatch_test_support::fixtures::Sandbox;
use vqbatch_test_support::mocks::{Behaviour, RecordingBackend};

fn pipeline(
    backend: &Arc<RecordingBackend>,
    settings: PipelineSettings,
) -> Result<(ExecutionPipeline, Metrics)> {
    let metrics = Metrics::new()?;
    let backend: Arc<dyn Backend> = backend.clone();
    Ok((
        ExecutionPipeline::new(backend, settings, metrics.clone()),
        metrics,
    ))
}

fn batch(sandbox: &Sandbox, count: u64) -> Result<Vec<Asset>> {
    (0..count)
        .map(|asset_id| sandbox.asset("example", asset_id % 2, asset_id))
        .collect()
}

#[tokio::test]
async fn unique_batch_yields_results_in_input_order() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "F0.3.1")?);
    let (pipeline, metrics) = pipeline(&backend, sandbox.settings())?;
    let mut assets = batch(&sandbox, 3)?;
    assets.reverse();

    let results = pipeline.run(&assets).await?.into_results()?;

    let ids: Vec<u64> = results.iter().map(|result| result.key.asset_id).collect();
    assert_eq!(ids, vec![2, 1, 0]);
    for (asset, result) in assets.iter().zip(&results) {
        assert_eq!(result.log_path, pipeline.log_path(asset));
        assert_eq!(result.executor_id, "VMAF_VF0.3.1");
        assert_eq!(result.mean("score"), Some(90.0));
        assert_eq!(result.series("ref_bytes"), Some(&[4096.0][..]));
        let log = fs::read_to_string(&result.log_path)?;
        assert!(log.starts_with("VMAF VERSION F0.3.1\n\n"));
    }
    assert_eq!(backend.invocations(), 3);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.assets_executed, 3);
    assert_eq!(snapshot.backend_success, 3);
    Ok(())
}

#[tokio::test]
async fn rerun_with_same_executor_hits_the_cache() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, metrics) = pipeline(&backend, sandbox.settings())?;
    let assets = batch(&sandbox, 2)?;

    let first = pipeline.run(&assets).await?.into_results()?;
    let second = pipeline.run(&assets).await?.into_results()?;

    assert_eq!(backend.invocations(), 2);
    assert_eq!(first, second);
    assert_eq!(metrics.snapshot().assets_cache_hit, 2);
    Ok(())
}

#[tokio::test]
async fn new_executor_version_gets_its_own_log() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let assets = batch(&sandbox, 1)?;
    let v1 = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let v2 = Arc::new(RecordingBackend::new("VMAF", "2")?);
    let (first, _) = pipeline(&v1, sandbox.settings())?;
    let (second, _) = pipeline(&v2, sandbox.settings())?;

    first.run(&assets).await?.into_results()?;
    let results = second.run(&assets).await?.into_results()?;

    assert_eq!(v2.invocations(), 1);
    assert_ne!(first.log_path(&assets[0]), second.log_path(&assets[0]));
    assert!(first.log_path(&assets[0]).is_file());
    assert_eq!(results[0].executor_id, "VMAF_V2");
    Ok(())
}

#[tokio::test]
async fn foreign_header_at_log_path_is_regenerated() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let assets = batch(&sandbox, 1)?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let path = pipeline.log_path(&assets[0]);
    fs::create_dir_all(path.parent().ok_or_else(|| anyhow::anyhow!("no parent"))?)?;
    fs::write(&path, "PSNR VERSION 9\n\nscore:1\n")?;

    let statuses = pipeline.cache_status(&assets)?;
    assert!(matches!(statuses[0].status, CacheStatus::Stale { .. }));

    let results = pipeline.run(&assets).await?.into_results()?;
    assert_eq!(backend.invocations(), 1);
    assert_eq!(results[0].mean("score"), Some(90.0));
    Ok(())
}

#[tokio::test]
async fn header_without_separator_is_regenerated() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let assets = batch(&sandbox, 1)?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let path = pipeline.log_path(&assets[0]);
    fs::create_dir_all(path.parent().ok_or_else(|| anyhow::anyhow!("no parent"))?)?;
    fs::write(&path, "VMAF VERSION 1\nscore:1\n")?;

    let statuses = pipeline.cache_status(&assets)?;
    assert!(matches!(statuses[0].status, CacheStatus::Stale { .. }));

    let results = pipeline.run(&assets).await?.into_results()?;
    assert_eq!(backend.invocations(), 1);
    assert_eq!(results[0].mean("score"), Some(90.0));
    assert!(fs::read_to_string(&path)?.starts_with("VMAF VERSION 1\n\n"));
    Ok(())
}

#[tokio::test]
async fn lookalike_datasets_never_share_a_log() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let slash = sandbox.asset("a/b", 0, 1)?;
    let dash = sandbox.asset("a-b", 0, 1)?;

    let first = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline_a, _) = pipeline(&first, sandbox.settings())?;
    pipeline_a.run(std::slice::from_ref(&slash)).await?.into_results()?;
    assert_eq!(first.invocations(), 1);

    let second = Arc::new(RecordingBackend::with_behaviour(
        "VMAF",
        "1",
        Behaviour::Score(40.0),
    )?);
    let (pipeline_b, _) = pipeline(&second, sandbox.settings())?;
    let results = pipeline_b.run(std::slice::from_ref(&dash)).await?.into_results()?;
    assert_eq!(second.invocations(), 1);
    assert_eq!(results[0].mean("score"), Some(40.0));
    assert_ne!(pipeline_b.log_path(&slash), pipeline_b.log_path(&dash));

    let both = pipeline_b.run(&[slash, dash]).await?.into_results()?;
    assert_eq!(second.invocations(), 1);
    assert_eq!(both[0].mean("score"), Some(90.0));
    assert_eq!(both[1].mean("score"), Some(40.0));
    Ok(())
}

#[tokio::test]
async fn very_long_dataset_names_still_run() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let dataset = "d".repeat(300);
    let assets = vec![sandbox.asset(&dataset, 0, 1)?];
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let settings = sandbox
        .settings()
        .with_fifo_mode(true)
        .with_delete_workdir(true);
    let (pipeline, _) = pipeline(&backend, settings)?;

    let results = pipeline.run(&assets).await?.into_results()?;

    assert_eq!(results[0].mean("score"), Some(90.0));
    assert!(assets[0].identity_string().len() <= 255);
    assert!(results[0].log_path.is_file());
    assert!(sandbox.workfiles()?.is_empty());
    let rerun = pipeline.run(&assets).await?.into_results()?;
    assert_eq!(rerun, results);
    assert_eq!(backend.invocations(), 1);
    Ok(())
}

#[tokio::test]
async fn fifo_mode_hands_named_pipes_to_the_backend() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings().with_fifo_mode(true))?;
    let assets = batch(&sandbox, 1)?;

    pipeline.run(&assets).await?.into_results()?;

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    for seen in [&calls[0].reference, &calls[0].distorted] {
        assert!(seen.existed);
        assert!(seen.is_fifo);
    }
    assert_eq!(calls[0].reference.bytes_read, Some(4096));
    assert_eq!(calls[0].distorted.bytes_read, Some(3072));
    let plan = pipeline.workfile_plan(&assets[0]);
    assert_eq!(calls[0].reference.path, plan.reference_workfile);
    Ok(())
}

#[tokio::test]
async fn fifo_mode_with_delete_workdir_leaves_nothing_behind() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let settings = sandbox
        .settings()
        .with_fifo_mode(true)
        .with_delete_workdir(true);
    let (pipeline, _) = pipeline(&backend, settings)?;
    let assets = batch(&sandbox, 2)?;

    let results = pipeline.run(&assets).await?.into_results()?;

    assert_eq!(results.len(), 2);
    assert!(sandbox.workfiles()?.is_empty());
    for asset in &assets {
        let plan = pipeline.workfile_plan(asset);
        let dir = plan
            .reference_workfile
            .parent()
            .ok_or_else(|| anyhow::anyhow!("no parent"))?;
        assert!(!dir.exists());
    }
    Ok(())
}

#[tokio::test]
async fn unread_pipes_do_not_block_the_batch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::with_behaviour(
        "VMAF",
        "1",
        Behaviour::SkipRead(50.0),
    )?);
    let settings = sandbox
        .settings()
        .with_fifo_mode(true)
        .with_delete_workdir(true);
    let (pipeline, _) = pipeline(&backend, settings)?;
    let assets = batch(&sandbox, 2)?;

    let results = tokio::time::timeout(Duration::from_secs(30), pipeline.run(&assets))
        .await??
        .into_results()?;

    assert_eq!(results[1].mean("score"), Some(50.0));
    assert!(sandbox.workfiles()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn copy_mode_keeps_workfiles_unless_asked() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let assets = batch(&sandbox, 1)?;

    pipeline.run(&assets).await?.into_results()?;

    let plan = pipeline.workfile_plan(&assets[0]);
    assert_eq!(
        sandbox.workfiles()?,
        vec![plan.distorted_workfile.clone(), plan.reference_workfile.clone()]
    );
    assert_eq!(fs::read(&plan.reference_workfile)?, fs::read(&assets[0].reference_path)?);
    Ok(())
}

#[tokio::test]
async fn duplicate_assets_abort_before_any_work() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let asset = sandbox.asset("example", 0, 1)?;
    let assets = vec![asset.clone(), sandbox.asset("example", 0, 2)?, asset];

    let err = pipeline.run(&assets).await.unwrap_err();

    assert!(matches!(err, ExecutorError::DuplicateAsset { ref key } if key.asset_id == 1));
    assert_eq!(backend.invocations(), 0);
    assert!(!sandbox.log_dir().exists());
    assert!(!sandbox.work_dir().exists());
    Ok(())
}

#[tokio::test]
async fn existing_log_skips_staging_entirely() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let assets = batch(&sandbox, 1)?;
    let path = pipeline.log_path(&assets[0]);
    fs::create_dir_all(path.parent().ok_or_else(|| anyhow::anyhow!("no parent"))?)?;
    fs::write(&path, "VMAF VERSION 1\n\nscore:42\n")?;
    fs::remove_file(&assets[0].reference_path)?;

    let results = pipeline.run(&assets).await?.into_results()?;

    assert_eq!(backend.invocations(), 0);
    assert_eq!(results[0].mean("score"), Some(42.0));
    assert!(!sandbox.work_dir().exists());
    Ok(())
}

#[tokio::test]
async fn backend_failure_leaves_no_log_and_is_retried() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let assets = batch(&sandbox, 2)?;
    let failing = Arc::new(RecordingBackend::with_behaviour(
        "VMAF",
        "1",
        Behaviour::Fail,
    )?);
    let (pipeline_a, metrics) = pipeline(&failing, sandbox.settings().with_fifo_mode(true))?;

    let report = pipeline_a.run(&assets).await?;

    assert_eq!(report.failed_count(), 2);
    assert!(matches!(
        report.failures().next().map(|failure| &failure.error),
        Some(ExecutorError::Backend { .. })
    ));
    for asset in &assets {
        assert!(!pipeline_a.log_path(asset).exists());
    }
    assert!(sandbox.workfiles()?.is_empty());
    let log_dir = pipeline_a.log_path(&assets[0]);
    let log_dir = log_dir.parent().ok_or_else(|| anyhow::anyhow!("no parent"))?;
    assert_eq!(fs::read_dir(log_dir)?.count(), 0);
    assert_eq!(metrics.snapshot().assets_failed, 2);
    assert_eq!(metrics.snapshot().backend_failure, 2);

    let working = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline_b, _) = pipeline(&working, sandbox.settings())?;
    pipeline_b.run(&assets).await?.into_results()?;
    assert_eq!(working.invocations(), 2);
    Ok(())
}

#[tokio::test]
async fn backend_timeout_cleans_up_and_fails_the_asset() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::with_behaviour(
        "VMAF",
        "1",
        Behaviour::Hang(Duration::from_secs(30)),
    )?);
    let settings = sandbox
        .settings()
        .with_fifo_mode(true)
        .with_backend_timeout_secs(Some(1));
    let (pipeline, metrics) = pipeline(&backend, settings)?;
    let assets = batch(&sandbox, 1)?;

    let report = pipeline.run(&assets).await?;

    assert!(matches!(
        report.failures().next().map(|failure| &failure.error),
        Some(ExecutorError::BackendTimeout { .. })
    ));
    assert!(!pipeline.log_path(&assets[0]).exists());
    assert!(sandbox.workfiles()?.is_empty());
    assert_eq!(metrics.snapshot().backend_failure, 1);
    Ok(())
}

#[tokio::test]
async fn shape_mismatch_fails_only_that_asset() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let mut assets = batch(&sandbox, 3)?;
    assets[1].distorted_size = Dimensions::new(16, 9);

    let report = pipeline.run(&assets).await?;

    assert_eq!(report.failed_count(), 1);
    assert!(report.outcomes[0].is_ok());
    assert!(matches!(
        &report.outcomes[1],
        Err(failure) if matches!(
            failure.error,
            ExecutorError::ShapeMismatch { field: "distorted_size", .. }
        )
    ));
    assert!(report.outcomes[2].is_ok());
    assert_eq!(backend.invocations(), 2);

    let summary = report.summary();
    assert_eq!(summary.failed, 1);
    assert!(matches!(
        &summary.outcomes[1],
        OutcomeSummary::Failed { kind: "shape_mismatch", .. }
    ));
    Ok(())
}

#[tokio::test]
async fn missing_source_fails_the_asset_without_a_log() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings().with_fifo_mode(true))?;
    let assets = batch(&sandbox, 1)?;
    fs::remove_file(&assets[0].distorted_path)?;

    let report = pipeline.run(&assets).await?;

    assert!(matches!(
        report.failures().next().map(|failure| &failure.error),
        Some(ExecutorError::Workfile { .. })
    ));
    assert_eq!(backend.invocations(), 0);
    assert!(!pipeline.log_path(&assets[0]).exists());
    Ok(())
}

#[tokio::test]
async fn bounded_concurrency_keeps_order_and_isolation() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let settings = sandbox
        .settings()
        .with_fifo_mode(true)
        .with_delete_workdir(true)
        .with_max_concurrency(4);
    let (pipeline, _) = pipeline(&backend, settings)?;
    let assets = batch(&sandbox, 6)?;

    let results = pipeline.run(&assets).await?.into_results()?;

    let ids: Vec<u64> = results.iter().map(|result| result.key.asset_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert!(results.iter().all(|result| result.series("dis_bytes") == Some(&[3072.0][..])));
    assert_eq!(backend.invocations(), 6);
    assert!(sandbox.workfiles()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn remove_logs_forces_a_rerun() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let backend = Arc::new(RecordingBackend::new("VMAF", "1")?);
    let (pipeline, _) = pipeline(&backend, sandbox.settings())?;
    let assets = batch(&sandbox, 2)?;
    pipeline.run(&assets).await?.into_results()?;

    assert!(pipeline.cache_status(&assets)?.iter().all(|status| status.status.is_hit()));
    assert_eq!(pipeline.remove_logs(&assets[..1])?, 1);
    assert_eq!(pipeline.remove_logs(&assets[..1])?, 0);
    let statuses = pipeline.cache_status(&assets)?;
    assert!(matches!(statuses[0].status, CacheStatus::Missing { .. }));
    assert!(statuses[1].status.is_hit());

    pipeline.run(&assets).await?.into_results()?;
    assert_eq!(backend.invocations(), 3);
    Ok(())
}
