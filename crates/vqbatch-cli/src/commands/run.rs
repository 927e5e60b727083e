//! `vqbatch run`.

use std::path::Path;

use tracing::info;
use vqbatch_executor::Asset;

use crate::commands::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::emit_json;

pub(crate) async fn handle_run(
    ctx: &AppContext,
    assets: &[Asset],
    output: Option<&Path>,
) -> CliResult<()> {
    let report = ctx.pipeline.run(assets).await.map_err(CliError::fatal)?;
    let summary = report.summary();
    emit_json(&summary, output)?;
    ctx.write_metrics()?;
    info!(
        run_id = %summary.run_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "batch report written"
    );

    if summary.failed > 0 {
        return Err(CliError::AssetsFailed {
            failed: summary.failed,
            total: assets.len(),
        });
    }
    Ok(())
}
