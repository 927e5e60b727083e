//! Default values for optional configuration fields.
//!
//! # Design
//! - Centralize defaults so serde, builders, and docs stay consistent.
//! - Keep the sequential, streaming, self-cleaning behaviour as the baseline.

/// Named-pipe staging is on unless explicitly disabled.
pub(crate) const FIFO_MODE: bool = true;
/// Workfiles and their directories are removed after each asset by default.
pub(crate) const DELETE_WORKDIR: bool = true;
/// One asset at a time.
pub(crate) const MAX_CONCURRENCY: usize = 1;
/// Log level used when neither the file nor `RUST_LOG` set one.
pub(crate) const LOG_LEVEL: &str = "info";

pub(crate) const fn fifo_mode() -> bool {
    FIFO_MODE
}

pub(crate) const fn delete_workdir() -> bool {
    DELETE_WORKDIR
}

pub(crate) const fn max_concurrency() -> usize {
    MAX_CONCURRENCY
}

pub(crate) fn log_level() -> String {
    LOG_LEVEL.to_string()
}
