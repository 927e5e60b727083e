//! Fake backends that record what the pipeline hands them.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use vqbatch_executor::{
    AssetKey, Backend, BackendRequest, ExecutorError, ExecutorIdentity, ExecutorResult,
};

/// What a [`RecordingBackend`] does when invoked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    /// Read both workfiles and append scores to the log.
    Score(f64),
    /// Read both workfiles, then fail.
    Fail,
    /// Append scores without reading either workfile.
    SkipRead(f64),
    /// Sleep for the given duration without reading anything.
    Hang(Duration),
}

/// State of a workfile as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkfileSeen {
    /// Path handed to the backend.
    pub path: PathBuf,
    /// Whether the path existed when the backend started.
    pub existed: bool,
    /// Whether the path was a named pipe.
    pub is_fifo: bool,
    /// Bytes read, when the backend read the workfile.
    pub bytes_read: Option<usize>,
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Asset the backend was invoked for.
    pub key: AssetKey,
    /// Reference workfile state.
    pub reference: WorkfileSeen,
    /// Distorted workfile state.
    pub distorted: WorkfileSeen,
    /// Pending log the backend appended to.
    pub log_path: PathBuf,
}

/// Backend double that records every invocation.
#[derive(Debug)]
pub struct RecordingBackend {
    identity: ExecutorIdentity,
    behaviour: Behaviour,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingBackend {
    /// Backend that reads its workfiles and logs `score`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid identity.
    pub fn new(executor_type: &str, version: &str) -> ExecutorResult<Self> {
        Self::with_behaviour(executor_type, version, Behaviour::Score(90.0))
    }

    /// Backend with an explicit behaviour.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid identity.
    pub fn with_behaviour(
        executor_type: &str,
        version: &str,
        behaviour: Behaviour,
    ) -> ExecutorResult<Self> {
        Ok(Self {
            identity: ExecutorIdentity::new(executor_type, version)?,
            behaviour,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.lock().len()
    }

    /// Copy of every recorded invocation, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Invocation>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn identity(&self) -> &ExecutorIdentity {
        &self.identity
    }

    async fn invoke(&self, request: &BackendRequest<'_>) -> ExecutorResult<()> {
        let mut reference = inspect(request.reference_workfile);
        let mut distorted = inspect(request.distorted_workfile);

        if matches!(self.behaviour, Behaviour::Score(_) | Behaviour::Fail) {
            let paths = (reference.path.clone(), distorted.path.clone());
            let (ref_bytes, dis_bytes) =
                tokio::task::spawn_blocking(move || (drain(&paths.0), drain(&paths.1)))
                    .await
                    .map_err(|err| ExecutorError::Backend {
                        reason: err.to_string(),
                    })?;
            reference.bytes_read = Some(ref_bytes.map_err(|err| io_failure(&reference.path, err))?);
            distorted.bytes_read = Some(dis_bytes.map_err(|err| io_failure(&distorted.path, err))?);
        }

        self.lock().push(Invocation {
            key: request.asset.key(),
            reference: reference.clone(),
            distorted: distorted.clone(),
            log_path: request.log_path.to_path_buf(),
        });

        match self.behaviour {
            Behaviour::Score(score) | Behaviour::SkipRead(score) => {
                let mut log = OpenOptions::new()
                    .append(true)
                    .open(request.log_path)
                    .map_err(|err| io_failure(request.log_path, err))?;
                writeln!(
                    log,
                    "frame:0 score:{score} ref_bytes:{} dis_bytes:{}",
                    reference.bytes_read.unwrap_or_default(),
                    distorted.bytes_read.unwrap_or_default(),
                )
                .and_then(|()| writeln!(log, "frame:1 score:{score}"))
                .map_err(|err| io_failure(request.log_path, err))?;
                Ok(())
            }
            Behaviour::Fail => Err(ExecutorError::Backend {
                reason: "recording backend asked to fail".to_string(),
            }),
            Behaviour::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

fn inspect(path: &Path) -> WorkfileSeen {
    let metadata = fs::symlink_metadata(path).ok();
    WorkfileSeen {
        path: path.to_path_buf(),
        existed: metadata.is_some(),
        is_fifo: metadata.is_some_and(|meta| meta.file_type().is_fifo()),
        bytes_read: None,
    }
}

fn drain(path: &Path) -> std::io::Result<usize> {
    let mut file = fs::File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
}

fn io_failure(path: &Path, err: std::io::Error) -> ExecutorError {
    ExecutorError::Backend {
        reason: format!("{}: {err}", path.display()),
    }
}
