//! # Design
//!
//! - One error enum for the execution pipeline with constant messages.
//! - Context (asset key, path, field) is carried in fields, never formatted in.
//! - Workfile errors are wrapped so callers can still match on their variants.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vqbatch_workfile::WorkfileError;

use crate::asset::{AssetKey, Dimensions};

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors produced by the execution pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Two assets in one batch share an identity triple.
    #[error("duplicate asset identity in batch")]
    DuplicateAsset {
        /// The repeated identity.
        key: AssetKey,
    },
    /// Two distinct assets resolve to the same log path.
    #[error("assets resolve to the same log path")]
    PathCollision {
        /// First asset claiming the path.
        first: AssetKey,
        /// Second asset claiming the path.
        second: AssetKey,
        /// The contested path.
        path: PathBuf,
    },
    /// Quality, reference and distorted dimensions disagree.
    #[error("asset dimensions do not match")]
    ShapeMismatch {
        /// Asset that failed validation.
        key: AssetKey,
        /// Which dimension pair disagreed with the quality dimensions.
        field: &'static str,
        /// Quality dimensions.
        expected: Dimensions,
        /// Offending dimensions.
        actual: Dimensions,
    },
    /// Executor type or version contains characters unsafe for paths.
    #[error("invalid executor identity")]
    InvalidIdentity {
        /// Field that failed validation.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// Workfile staging or teardown failed.
    #[error("workfile operation failed")]
    Workfile {
        /// Underlying workfile error.
        #[from]
        source: WorkfileError,
    },
    /// The backend program could not be started.
    #[error("failed to spawn backend")]
    BackendSpawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The backend program exited unsuccessfully.
    #[error("backend exited unsuccessfully")]
    BackendExit {
        /// Program that failed.
        program: PathBuf,
        /// Exit code when the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error, truncated.
        stderr: String,
    },
    /// A backend reported a failure of its own.
    #[error("backend invocation failed")]
    Backend {
        /// Backend-supplied reason.
        reason: String,
    },
    /// The backend did not finish within the configured limit.
    #[error("backend timed out")]
    BackendTimeout {
        /// Configured limit.
        timeout: Duration,
    },
    /// A log file did not follow the header/separator/body layout.
    #[error("malformed log file")]
    LogFormat {
        /// Log that failed to parse.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// A log header names a different executor than the one reading it.
    #[error("log was produced by a different executor")]
    LogIdentityMismatch {
        /// Log that was rejected.
        path: PathBuf,
        /// Executor id of the reader.
        expected: String,
        /// Executor id recorded in the log header.
        found: String,
    },
    /// IO failures while interacting with logs.
    #[error("executor io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// At least one asset in a batch failed.
    #[error("batch finished with failed assets")]
    BatchFailed {
        /// Number of failed assets.
        failed: usize,
        /// Number of assets in the batch.
        total: usize,
    },
}

impl ExecutorError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Short label used in structured logs for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateAsset { .. } => "duplicate_asset",
            Self::PathCollision { .. } => "path_collision",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::InvalidIdentity { .. } => "invalid_identity",
            Self::Workfile { .. } => "workfile",
            Self::BackendSpawn { .. } => "backend_spawn",
            Self::BackendExit { .. } => "backend_exit",
            Self::Backend { .. } => "backend",
            Self::BackendTimeout { .. } => "backend_timeout",
            Self::LogFormat { .. } => "log_format",
            Self::LogIdentityMismatch { .. } => "log_identity_mismatch",
            Self::Io { .. } => "io",
            Self::BatchFailed { .. } => "batch_failed",
        }
    }

    /// Human-oriented detail including context fields, for reports.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::DuplicateAsset { key } => format!("{self}: {key}"),
            Self::PathCollision { first, second, .. } => format!("{self}: {first} and {second}"),
            Self::ShapeMismatch {
                field,
                expected,
                actual,
                ..
            } => format!("{self}: {field} is {actual}, quality is {expected}"),
            Self::InvalidIdentity { field, value } => format!("{self}: {field}={value}"),
            Self::Workfile { source: inner } => match inner {
                WorkfileError::Io {
                    operation,
                    path,
                    source,
                } => format!("{self}: {operation} {}: {source}", path.display()),
                WorkfileError::ProducerFailed { role, path, source } => {
                    format!("{self}: {role} producer {}: {source}", path.display())
                }
                other => format!("{self}: {other}"),
            },
            Self::BackendSpawn { program, source } => {
                format!("{self}: {}: {source}", program.display())
            }
            Self::BackendExit { code, stderr, .. } => match code {
                Some(code) => format!("{self}: exit code {code}: {stderr}"),
                None => format!("{self}: terminated by signal: {stderr}"),
            },
            Self::Backend { reason } => format!("{self}: {reason}"),
            Self::BackendTimeout { timeout } => format!("{self}: after {}s", timeout.as_secs()),
            Self::LogFormat { path, reason } => format!("{self}: {}: {reason}", path.display()),
            Self::LogIdentityMismatch {
                expected, found, ..
            } => format!("{self}: expected {expected}, found {found}"),
            Self::Io {
                operation,
                path,
                source,
            } => format!("{self}: {operation} {}: {source}", path.display()),
            Self::BatchFailed { failed, total } => format!("{self}: {failed} of {total}"),
        }
    }
}
