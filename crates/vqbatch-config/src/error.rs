//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration file extension is not a supported format.
    #[error("unsupported configuration format")]
    UnsupportedFormat {
        /// Path of the configuration file.
        path: PathBuf,
    },
    /// `${VAR}` interpolation referenced missing or unusable variables.
    #[error("environment interpolation failed")]
    EnvInterpolation {
        /// One message per failed placeholder.
        errors: Vec<String>,
    },
    /// The document was not valid YAML for the expected schema.
    #[error("failed to parse configuration document")]
    Parse {
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        reason: &'static str,
        value: Option<String>,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value,
            reason,
        }
    }
}
