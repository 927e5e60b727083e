//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vqbatch_config::{RunnerConfig, load_from_path};
use vqbatch_telemetry::{LogFormat, LoggingConfig, build_sha, init_logging};

use crate::commands::{AppContext, handle_remove_logs, handle_run, handle_status};
use crate::error::{CliError, CliResult};
use crate::manifest::load_manifest;

/// Parses CLI arguments, executes the requested command, and reports errors.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let batch = cli.command.batch();
    let config = load_from_path(&batch.config).map_err(CliError::fatal)?;
    install_logging(&cli, &config)?;

    let assets = load_manifest(&batch.manifest)?;
    let ctx = AppContext::from_config(config)?;

    match cli.command {
        Command::Run(args) => handle_run(&ctx, &assets, args.output.as_deref()).await,
        Command::Status(_) => handle_status(&ctx, &assets),
        Command::RemoveLogs(_) => handle_remove_logs(&ctx, &assets),
    }
}

fn install_logging(cli: &Cli, config: &RunnerConfig) -> CliResult<()> {
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.telemetry.log_level);
    let format = cli.log_format.map_or_else(
        || LogFormat::from_setting(config.telemetry.log_format.as_deref()),
        LogFormatArg::into_format,
    );
    init_logging(&LoggingConfig {
        level,
        format,
        build_sha: build_sha(),
    })
    .map_err(CliError::fatal)
}

#[derive(Parser)]
#[command(
    name = "vqbatch",
    about = "Run a quality backend over asset batches with cached logs"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "VQBATCH_LOG_LEVEL",
        help = "Log level or filter directive; overrides the config file"
    )]
    log_level: Option<String>,
    #[arg(
        long,
        global = true,
        env = "VQBATCH_LOG_FORMAT",
        value_enum,
        help = "Log output format; overrides the config file"
    )]
    log_format: Option<LogFormatArg>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure a log exists for every asset and print the batch report.
    Run(RunArgs),
    /// Report which assets already have a finished log.
    Status(BatchArgs),
    /// Delete the cached logs of every asset in the manifest.
    RemoveLogs(BatchArgs),
}

impl Command {
    const fn batch(&self) -> &BatchArgs {
        match self {
            Self::Run(args) => &args.batch,
            Self::Status(args) | Self::RemoveLogs(args) => args,
        }
    }
}

#[derive(Args)]
struct BatchArgs {
    #[arg(long, env = "VQBATCH_CONFIG", help = "Runner configuration (YAML or JSON)")]
    config: PathBuf,
    #[arg(long, help = "Asset manifest (YAML or JSON)")]
    manifest: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    batch: BatchArgs,
    #[arg(long, help = "Write the JSON report here instead of stdout")]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl LogFormatArg {
    const fn into_format(self) -> LogFormat {
        match self {
            Self::Json => LogFormat::Json,
            Self::Pretty => LogFormat::Pretty,
        }
    }
}
