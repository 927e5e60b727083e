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

//! File-backed configuration for the vqbatch runner.
//!
//! Layout: `model.rs` (typed config sections), `defaults.rs` (default values),
//! `validate.rs` (field validation), `loader.rs` (YAML loading and `${VAR}`
//! interpolation).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{Interpolation, interpolate, interpolate_with, load_from_path, parse_yaml};
pub use model::{BackendSettings, PipelineSettings, RunnerConfig, TelemetrySettings};
