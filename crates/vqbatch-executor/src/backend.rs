//! Backend boundary: the external tool that turns a workfile pair into a log.
//!
//! # Design
//! - Identity is an explicit capability of every backend, not something the
//!   pipeline infers.
//! - `invoke` is awaited to completion; errors are returned, never swallowed.
//! - [`CommandBackend`] runs a program from an argument template, appending its
//!   stdout to the pending log. The child runs in its own process group,
//!   which is killed when the child exits or the call is dropped, so helpers
//!   it forked cannot outlive the invocation.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;
use vqbatch_config::BackendSettings;

use crate::asset::Asset;
use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::ExecutorIdentity;
use crate::log_cache::LogFile;
use crate::result::{AssetResult, parse_default};

/// Maximum stderr kept for error reports; the rest is read and discarded.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Everything a backend needs for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    /// Asset being evaluated.
    pub asset: &'a Asset,
    /// Staged reference workfile (regular file or named pipe).
    pub reference_workfile: &'a Path,
    /// Staged distorted workfile (regular file or named pipe).
    pub distorted_workfile: &'a Path,
    /// Log to append output to; its header is already written.
    pub log_path: &'a Path,
}

/// A quality backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Type and version of this backend.
    fn identity(&self) -> &ExecutorIdentity;

    /// Run the backend for one asset, appending its output to
    /// `request.log_path`.
    async fn invoke(&self, request: &BackendRequest<'_>) -> ExecutorResult<()>;

    /// Turn a finished log into a result. Defaults to the `key:value` grammar.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be interpreted.
    fn parse_result(&self, asset: &Asset, log: &LogFile) -> ExecutorResult<AssetResult> {
        parse_default(self.identity(), asset, log)
    }
}

/// Runs an external program per asset.
///
/// Arguments may contain `{ref}`, `{dis}`, `{log}`, `{width}`, `{height}` and
/// `{asset}` placeholders; width and height are the quality dimensions.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    identity: ExecutorIdentity,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandBackend {
    /// Build a backend for `program` with an argument template.
    #[must_use]
    pub fn new(identity: ExecutorIdentity, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            identity,
            program: program.into(),
            args,
        }
    }

    /// Build a backend from the `backend` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidIdentity`] for unusable type/version.
    pub fn from_settings(settings: &BackendSettings) -> ExecutorResult<Self> {
        let identity =
            ExecutorIdentity::new(&settings.executor_type, &settings.executor_version)?;
        Ok(Self::new(
            identity,
            settings.program.clone(),
            settings.args.clone(),
        ))
    }

    /// Program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Expand the argument template for `request`.
    #[must_use]
    pub fn render_args(&self, request: &BackendRequest<'_>) -> Vec<String> {
        let size = request.asset.quality_size;
        let reference = request.reference_workfile.to_string_lossy();
        let distorted = request.distorted_workfile.to_string_lossy();
        let log = request.log_path.to_string_lossy();
        let width = size.width.to_string();
        let height = size.height.to_string();
        let asset = request.asset.identity_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{ref}", &reference)
                    .replace("{dis}", &distorted)
                    .replace("{log}", &log)
                    .replace("{width}", &width)
                    .replace("{height}", &height)
                    .replace("{asset}", &asset)
            })
            .collect()
    }
}

#[async_trait]
impl Backend for CommandBackend {
    fn identity(&self) -> &ExecutorIdentity {
        &self.identity
    }

    async fn invoke(&self, request: &BackendRequest<'_>) -> ExecutorResult<()> {
        let log = OpenOptions::new()
            .append(true)
            .open(request.log_path)
            .map_err(|err| ExecutorError::io("backend.open_log", request.log_path, err))?;

        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| ExecutorError::BackendSpawn {
                program: self.program.clone(),
                source,
            })?;
        let mut group = ProcessGroup::of(child.id());
        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        let status = child
            .wait()
            .await
            .map_err(|err| ExecutorError::io("backend.wait", &self.program, err))?;
        // Leftover group members would hold stderr open.
        group.kill();
        let stderr = stderr_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

        if status.success() {
            if !stderr.is_empty() {
                debug!(program = %self.program.display(), stderr = %stderr, "backend wrote to stderr");
            }
            return Ok(());
        }
        Err(ExecutorError::BackendExit {
            program: self.program.clone(),
            code: status.code(),
            stderr,
        })
    }
}

/// Process group of a spawned backend; killed on [`ProcessGroup::kill`] or drop.
struct ProcessGroup {
    id: Option<Pid>,
}

impl ProcessGroup {
    fn of(child_id: Option<u32>) -> Self {
        Self {
            id: child_id
                .and_then(|id| i32::try_from(id).ok())
                .map(Pid::from_raw),
        }
    }

    fn kill(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match killpg(id, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => debug!(error = %err, group = id.as_raw(), "failed to kill backend process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Read a stream to its end, keeping at most [`MAX_STDERR_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut kept = Vec::new();
    let Some(mut stream) = stream else {
        return kept;
    };
    let mut chunk = [0_u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                let room = MAX_STDERR_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..read.min(room)]);
            }
        }
    }
    kept
}
