//! Error types for telemetry operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Step at which a Prometheus collector was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStage {
    /// Constructing the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber could not be installed.
    #[error("tracing subscriber install failed")]
    Subscriber {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A Prometheus collector could not be built or registered.
    #[error("metric collector setup failed")]
    Metric {
        /// Metric name.
        name: &'static str,
        /// Step that failed.
        stage: MetricStage,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be encoded in the text exposition format.
    #[error("metrics encoding failed")]
    Encode {
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The encoded exposition was not UTF-8.
    #[error("metrics exposition is not utf-8")]
    Utf8 {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },
    /// The exposition file could not be written.
    #[error("metrics file write failed")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}
