//! `vqbatch status` and `vqbatch remove-logs`.

use serde::Serialize;
use vqbatch_executor::Asset;

use crate::commands::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::emit_json;

#[derive(Debug, Serialize)]
struct RemovedLogs {
    executor_id: String,
    requested: usize,
    removed: usize,
}

pub(crate) fn handle_status(ctx: &AppContext, assets: &[Asset]) -> CliResult<()> {
    let statuses = ctx.pipeline.cache_status(assets).map_err(CliError::fatal)?;
    emit_json(&statuses, None)?;
    Ok(())
}

pub(crate) fn handle_remove_logs(ctx: &AppContext, assets: &[Asset]) -> CliResult<()> {
    let removed = ctx.pipeline.remove_logs(assets).map_err(CliError::fatal)?;
    emit_json(
        &RemovedLogs {
            executor_id: ctx.pipeline.executor_id(),
            requested: assets.len(),
            removed,
        },
        None,
    )?;
    Ok(())
}
