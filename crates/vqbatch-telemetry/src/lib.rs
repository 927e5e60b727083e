#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the vqbatch workspace.
//!
//! Layout: `init.rs` (tracing subscriber installation), `metrics.rs`
//! (Prometheus registry), `error.rs` (error types).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{MetricStage, Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{AssetOutcome, Metrics, MetricsSnapshot};
