//! # Design
//!
//! - Constant-message errors for workfile staging.
//! - Operation and path context lives in fields so tests can match on it.
//! - Source errors are preserved, never interpolated into the message.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::WorkfileRole;

/// Result type for workfile operations.
pub type WorkfileResult<T> = Result<T, WorkfileError>;

/// Errors produced while staging or tearing down workfiles.
#[derive(Debug, Error)]
pub enum WorkfileError {
    /// IO failures while interacting with the filesystem.
    #[error("workfile io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Nix syscall failures (named pipe creation).
    #[error("workfile nix failure")]
    Nix {
        /// Operation that triggered the nix failure.
        operation: &'static str,
        /// Path involved in the nix failure.
        path: PathBuf,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Plan validation failures.
    #[error("workfile invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// A named-pipe producer failed to copy its source.
    #[error("workfile producer failed")]
    ProducerFailed {
        /// Which side of the pair the producer was feeding.
        role: WorkfileRole,
        /// Path the producer was reading or writing.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A producer task panicked or was cancelled before reporting.
    #[error("workfile producer aborted")]
    ProducerPanicked {
        /// Which side of the pair the producer was feeding.
        role: WorkfileRole,
    },
}

impl WorkfileError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn nix(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: nix::Error,
    ) -> Self {
        Self::Nix {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn producer(role: WorkfileRole, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ProducerFailed {
            role,
            path: path.into(),
            source,
        }
    }

    /// Operation label for metrics and logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Io { operation, .. } | Self::Nix { operation, .. } => operation,
            Self::InvalidInput { .. } => "validate_plan",
            Self::ProducerFailed { .. } => "producer.copy",
            Self::ProducerPanicked { .. } => "producer.join",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn workfile_error_helpers_build_variants() {
        let io_err = WorkfileError::io("stage.copy", "ref.yuv", io::Error::other("io"));
        assert!(matches!(io_err, WorkfileError::Io { .. }));
        assert_eq!(io_err.operation(), "stage.copy");
        assert!(io_err.source().is_some());

        let nix_err = WorkfileError::nix("stage.mkfifo", "dis.yuv", nix::Error::EEXIST);
        assert!(matches!(nix_err, WorkfileError::Nix { .. }));
        assert!(nix_err.source().is_some());

        let producer_err = WorkfileError::producer(
            WorkfileRole::Distorted,
            "dis.yuv",
            io::Error::other("copy"),
        );
        assert_eq!(producer_err.to_string(), "workfile producer failed");
        assert_eq!(producer_err.operation(), "producer.copy");

        let panicked = WorkfileError::ProducerPanicked {
            role: WorkfileRole::Reference,
        };
        assert!(panicked.source().is_none());
    }
}
