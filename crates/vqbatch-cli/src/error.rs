//! CLI error type and exit codes.

use std::fmt::{self, Display, Formatter};

/// CLI-level error type to distinguish fatal errors from per-asset failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Fatal(anyhow::Error),
    AssetsFailed { failed: usize, total: usize },
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn fatal(error: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal(_) => 1,
            Self::AssetsFailed { .. } => 2,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Fatal(error) => format!("{error:#}"),
            Self::AssetsFailed { failed, total } => {
                format!("{failed} of {total} assets failed")
            }
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        Self::Fatal(error)
    }
}
