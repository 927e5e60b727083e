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

//! Transient workfile staging for backend invocations.
//!
//! A workfile pair is materialised from the reference and distorted source
//! media right before the backend runs, either as plain byte copies or as
//! named pipes fed by two concurrent producers, and torn down afterwards.

pub mod error;
pub mod model;
pub mod stager;

pub use error::{WorkfileError, WorkfileResult};
pub use model::{ProducerOutcome, ProducerReport, StagingMode, WorkfilePlan, WorkfileRole};
pub use stager::{StagedWorkfiles, WorkfileStager};
