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
#![allow(clippy::module_name_repetitions)]

//! Asset execution pipeline.
//!
//! Runs a quality backend over batches of reference/distorted asset pairs.
//! Each asset's backend output is cached as a log keyed by executor identity
//! and asset parameterisation, so a rerun with the same executor skips the
//! backend entirely. Media is staged as transient workfiles (copies or named
//! pipes) only while the backend runs.

pub mod asset;
pub mod backend;
pub mod error;
pub mod identity;
pub mod log_cache;
pub mod pipeline;
pub mod report;
pub mod result;

pub use asset::{Asset, AssetKey, Dimensions};
pub use backend::{Backend, BackendRequest, CommandBackend};
pub use error::{ExecutorError, ExecutorResult};
pub use identity::ExecutorIdentity;
pub use log_cache::{CacheStatus, LogCache, LogFile, PendingLog};
pub use pipeline::ExecutionPipeline;
pub use report::{
    AssetCacheStatus, AssetFailure, AssetOutcome, BatchReport, BatchSummary, OutcomeSummary,
};
pub use result::{AssetResult, parse_default, parse_scores};
