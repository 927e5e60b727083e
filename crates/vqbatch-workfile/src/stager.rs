//! Workfile staging and teardown.
//!
//! # Design
//! - Copy mode performs both byte copies on the blocking pool before returning.
//! - FIFO mode creates both named pipes before either producer starts, then
//!   spawns one blocking producer per pipe. `stage` waits for both producers
//!   to report that they started, never for them to finish.
//! - [`StagedWorkfiles::release`] is the join point. A producer whose pipe was
//!   never opened by a reader is unblocked by draining the pipe from our side.
//! - Teardown treats missing paths as success and propagates everything else.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vqbatch_telemetry::Metrics;

use crate::error::{WorkfileError, WorkfileResult};
use crate::model::{ProducerOutcome, ProducerReport, StagingMode, WorkfilePlan, WorkfileRole};

const DRAIN_POLL: Duration = Duration::from_millis(5);
const DRAIN_BUFFER_BYTES: usize = 64 * 1024;

/// Materialises and tears down workfile pairs.
#[derive(Clone)]
pub struct WorkfileStager {
    mode: StagingMode,
    metrics: Metrics,
}

impl WorkfileStager {
    /// Build a stager for the given mode.
    #[must_use]
    pub const fn new(mode: StagingMode, metrics: Metrics) -> Self {
        Self { mode, metrics }
    }

    /// Staging mode in effect.
    #[must_use]
    pub const fn mode(&self) -> StagingMode {
        self.mode
    }

    /// Create both workfiles for `plan`, creating parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is missing, a directory or named pipe
    /// cannot be created, a copy fails, or a producer dies before starting.
    pub async fn stage(&self, plan: &WorkfilePlan) -> WorkfileResult<StagedWorkfiles> {
        let result = self.stage_pair(plan).await;
        self.record("stage", result.is_ok());
        if let Err(err) = &result {
            warn!(
                error = %err,
                operation = err.operation(),
                mode = self.mode.as_str(),
                "workfile staging failed"
            );
        }
        result
    }

    async fn stage_pair(&self, plan: &WorkfilePlan) -> WorkfileResult<StagedWorkfiles> {
        plan.validate()?;
        for role in [WorkfileRole::Reference, WorkfileRole::Distorted] {
            let source = plan.source(role);
            fs::metadata(source).map_err(|err| WorkfileError::io("stage.source", source, err))?;
            if let Some(parent) = plan.workfile(role).parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| WorkfileError::io("stage.create_parent", parent, err))?;
            }
        }

        let state = match self.mode {
            StagingMode::Copy => Staged::Copied(copy_pair(plan).await?),
            StagingMode::Fifo => stream_pair(plan).await?,
        };
        info!(
            mode = self.mode.as_str(),
            reference = %plan.reference_workfile.display(),
            distorted = %plan.distorted_workfile.display(),
            "staged workfiles"
        );
        Ok(StagedWorkfiles {
            plan: plan.clone(),
            state,
            metrics: self.metrics.clone(),
        })
    }

    /// Remove leftovers at both workfile paths ahead of staging.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing path cannot be removed.
    pub fn clear(&self, plan: &WorkfilePlan) -> WorkfileResult<()> {
        let result = remove_file_if_present("clear.remove_file", &plan.reference_workfile)
            .and_then(|_| remove_file_if_present("clear.remove_file", &plan.distorted_workfile))
            .map(|_| ());
        self.record("clear", result.is_ok());
        result
    }

    /// Remove both workfiles and, when `remove_dirs` is set, their parent
    /// directories (reference parent first). Missing paths are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for any removal failure other than not-found.
    pub fn unstage(&self, plan: &WorkfilePlan, remove_dirs: bool) -> WorkfileResult<()> {
        let result = unstage_pair(plan, remove_dirs);
        self.record("unstage", result.is_ok());
        result
    }

    fn record(&self, op: &str, ok: bool) {
        self.metrics
            .inc_workfile_op(op, if ok { "ok" } else { "error" });
    }
}

/// A staged workfile pair, holding any producers still feeding it.
pub struct StagedWorkfiles {
    plan: WorkfilePlan,
    state: Staged,
    metrics: Metrics,
}

enum Staged {
    Copied(ProducerReport),
    Streaming {
        reference: Producer,
        distorted: Producer,
    },
}

impl StagedWorkfiles {
    /// Plan this pair was staged from.
    #[must_use]
    pub const fn plan(&self) -> &WorkfilePlan {
        &self.plan
    }

    /// Whether every producer has stopped (always true for copies).
    #[must_use]
    pub fn producers_finished(&self) -> bool {
        match &self.state {
            Staged::Copied(_) => true,
            Staged::Streaming {
                reference,
                distorted,
            } => reference.is_finished() && distorted.is_finished(),
        }
    }

    /// Join both producers, unblocking any whose pipe was never read.
    ///
    /// Both producers are always joined before an error is surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`WorkfileError::ProducerFailed`] when a copy failed, or
    /// [`WorkfileError::ProducerPanicked`] when a producer died.
    pub async fn release(self) -> WorkfileResult<ProducerReport> {
        let result = match self.state {
            Staged::Copied(report) => Ok(report),
            Staged::Streaming {
                reference,
                distorted,
            } => {
                let reference = reference.finish().await;
                let distorted = distorted.finish().await;
                match (reference, distorted) {
                    (Ok(reference), Ok(distorted)) => Ok(ProducerReport {
                        reference,
                        distorted,
                    }),
                    (Err(err), _) | (_, Err(err)) => Err(err),
                }
            }
        };
        self.metrics
            .inc_workfile_op("release", if result.is_ok() { "ok" } else { "error" });
        result
    }
}

async fn copy_pair(plan: &WorkfilePlan) -> WorkfileResult<ProducerReport> {
    let owned = plan.clone();
    tokio::task::spawn_blocking(move || {
        let reference = copy_one(&owned, WorkfileRole::Reference)?;
        let distorted = copy_one(&owned, WorkfileRole::Distorted)?;
        Ok(ProducerReport {
            reference,
            distorted,
        })
    })
    .await
    .map_err(|_| WorkfileError::ProducerPanicked {
        role: WorkfileRole::Reference,
    })?
}

fn copy_one(plan: &WorkfilePlan, role: WorkfileRole) -> WorkfileResult<ProducerOutcome> {
    let target = plan.workfile(role);
    let bytes = fs::copy(plan.source(role), target)
        .map_err(|err| WorkfileError::io("stage.copy", target, err))?;
    debug!(role = %role, bytes, target = %target.display(), "copied workfile");
    Ok(ProducerOutcome::Complete { bytes })
}

async fn stream_pair(plan: &WorkfilePlan) -> WorkfileResult<Staged> {
    make_fifo(&plan.reference_workfile)?;
    if let Err(err) = make_fifo(&plan.distorted_workfile) {
        if let Err(cleanup) = remove_file_if_present("stage.cleanup", &plan.reference_workfile) {
            warn!(error = %cleanup, "failed to remove half-created named pipe");
        }
        return Err(err);
    }

    let (reference, reference_started) = Producer::spawn(WorkfileRole::Reference, plan);
    let (distorted, distorted_started) = Producer::spawn(WorkfileRole::Distorted, plan);
    let reference_started = reference_started.await.is_ok();
    let distorted_started = distorted_started.await.is_ok();
    if !reference_started {
        return Err(WorkfileError::ProducerPanicked {
            role: WorkfileRole::Reference,
        });
    }
    if !distorted_started {
        return Err(WorkfileError::ProducerPanicked {
            role: WorkfileRole::Distorted,
        });
    }
    Ok(Staged::Streaming {
        reference,
        distorted,
    })
}

fn make_fifo(path: &Path) -> WorkfileResult<()> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    mkfifo(path, mode).map_err(|err| WorkfileError::nix("stage.mkfifo", path, err))
}

struct Producer {
    role: WorkfileRole,
    fifo: PathBuf,
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<WorkfileResult<ProducerOutcome>>>,
}

/// Flags a producer as stopped however its closure exits, panics included.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Producer {
    fn spawn(role: WorkfileRole, plan: &WorkfilePlan) -> (Self, oneshot::Receiver<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));
        let guard = DoneGuard(Arc::clone(&done));
        let source = plan.source(role).to_path_buf();
        let fifo = plan.workfile(role).to_path_buf();
        let target = fifo.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            started_tx.send(()).ok();
            produce(role, &source, &target)
        });

        (
            Self {
                role,
                fifo,
                done,
                handle: Some(handle),
            },
            started_rx,
        )
    }

    fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    async fn finish(mut self) -> WorkfileResult<ProducerOutcome> {
        let role = self.role;
        let Some(handle) = self.handle.take() else {
            return Err(WorkfileError::ProducerPanicked { role });
        };

        if !handle.is_finished() {
            let fifo = self.fifo.clone();
            let done = Arc::clone(&self.done);
            tokio::task::spawn_blocking(move || drain_until_done(role, &fifo, &done))
                .await
                .map_err(|_| WorkfileError::ProducerPanicked { role })??;
        }

        handle
            .await
            .map_err(|_| WorkfileError::ProducerPanicked { role })?
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if self.handle.take().is_none() || self.is_finished() {
            return;
        }
        let role = self.role;
        let fifo = self.fifo.clone();
        let done = Arc::clone(&self.done);
        let spawned = std::thread::Builder::new()
            .name(format!("vqbatch-drain-{role}"))
            .spawn(move || {
                if let Err(err) = drain_until_done(role, &fifo, &done) {
                    warn!(error = %err, role = %role, "failed to drain abandoned named pipe");
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, role = %role, "failed to spawn named pipe drain thread");
        }
    }
}

fn produce(role: WorkfileRole, source: &Path, fifo: &Path) -> WorkfileResult<ProducerOutcome> {
    debug!(role = %role, fifo = %fifo.display(), "producer started");
    let mut sink = OpenOptions::new()
        .write(true)
        .open(fifo)
        .map_err(|err| WorkfileError::producer(role, fifo, err))?;
    let mut input = File::open(source).map_err(|err| WorkfileError::producer(role, source, err))?;

    match io::copy(&mut input, &mut sink) {
        Ok(bytes) => {
            debug!(role = %role, bytes, "producer finished");
            Ok(ProducerOutcome::Complete { bytes })
        }
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
            warn!(
                role = %role,
                fifo = %fifo.display(),
                "reader closed named pipe before the copy finished"
            );
            Ok(ProducerOutcome::Partial)
        }
        Err(err) => Err(WorkfileError::producer(role, fifo, err)),
    }
}

/// Read and discard from `fifo` until the producer feeding it stops.
fn drain_until_done(role: WorkfileRole, fifo: &Path, done: &AtomicBool) -> WorkfileResult<()> {
    let mut reader = OpenOptions::new()
        .read(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(fifo)
        .map_err(|err| WorkfileError::io("release.open_reader", fifo, err))?;
    let mut buffer = vec![0_u8; DRAIN_BUFFER_BYTES];
    let mut drained: usize = 0;

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                if done.load(Ordering::Acquire) {
                    break;
                }
                std::thread::sleep(DRAIN_POLL);
            }
            Ok(read) => drained = drained.saturating_add(read),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                if done.load(Ordering::Acquire) {
                    break;
                }
                std::thread::sleep(DRAIN_POLL);
            }
            Err(err) => return Err(WorkfileError::io("release.drain", fifo, err)),
        }
    }

    debug!(role = %role, drained, fifo = %fifo.display(), "drained unread named pipe");
    Ok(())
}

fn unstage_pair(plan: &WorkfilePlan, remove_dirs: bool) -> WorkfileResult<()> {
    remove_file_if_present("unstage.remove_file", &plan.reference_workfile)?;
    remove_file_if_present("unstage.remove_file", &plan.distorted_workfile)?;
    if remove_dirs {
        for workfile in [&plan.reference_workfile, &plan.distorted_workfile] {
            if let Some(parent) = workfile.parent() {
                remove_dir_if_present(parent)?;
            }
        }
    }
    debug!(
        reference = %plan.reference_workfile.display(),
        remove_dirs,
        "unstaged workfiles"
    );
    Ok(())
}

fn remove_file_if_present(operation: &'static str, path: &Path) -> WorkfileResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(WorkfileError::io(operation, path, err)),
    }
}

fn remove_dir_if_present(path: &Path) -> WorkfileResult<()> {
    match fs::remove_dir(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            Err(WorkfileError::io("unstage.remove_dir", path, err))
        }
        _ => Ok(()),
    }
}
