//! Domain models for workfile staging.
//!
//! # Design
//! - Plans are plain path bundles; deriving them is the caller's concern.
//! - Producer outcomes are reported per side so callers can log partial copies.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{WorkfileError, WorkfileResult};

/// How the workfile pair is materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    /// Byte-for-byte copies of both sources.
    Copy,
    /// Named pipes fed by two concurrent producers.
    Fifo,
}

impl StagingMode {
    /// Map the `fifo_mode` configuration flag to a staging mode.
    #[must_use]
    pub const fn from_fifo_flag(fifo_mode: bool) -> Self {
        if fifo_mode { Self::Fifo } else { Self::Copy }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Fifo => "fifo",
        }
    }
}

/// Which half of a workfile pair a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkfileRole {
    /// The reference (pristine) media.
    Reference,
    /// The distorted (encoded) media.
    Distorted,
}

impl WorkfileRole {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Distorted => "distorted",
        }
    }
}

impl fmt::Display for WorkfileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source and destination paths for one asset's workfile pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkfilePlan {
    /// Reference media to read.
    pub reference_source: PathBuf,
    /// Distorted media to read.
    pub distorted_source: PathBuf,
    /// Where the reference workfile is materialised.
    pub reference_workfile: PathBuf,
    /// Where the distorted workfile is materialised.
    pub distorted_workfile: PathBuf,
}

impl WorkfilePlan {
    /// Bundle the four paths of a workfile pair.
    #[must_use]
    pub fn new(
        reference_source: impl Into<PathBuf>,
        distorted_source: impl Into<PathBuf>,
        reference_workfile: impl Into<PathBuf>,
        distorted_workfile: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reference_source: reference_source.into(),
            distorted_source: distorted_source.into(),
            reference_workfile: reference_workfile.into(),
            distorted_workfile: distorted_workfile.into(),
        }
    }

    /// Source path for `role`.
    #[must_use]
    pub fn source(&self, role: WorkfileRole) -> &Path {
        match role {
            WorkfileRole::Reference => &self.reference_source,
            WorkfileRole::Distorted => &self.distorted_source,
        }
    }

    /// Workfile path for `role`.
    #[must_use]
    pub fn workfile(&self, role: WorkfileRole) -> &Path {
        match role {
            WorkfileRole::Reference => &self.reference_workfile,
            WorkfileRole::Distorted => &self.distorted_workfile,
        }
    }

    /// Reject plans whose workfiles collide or have no parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkfileError::InvalidInput`] describing the first problem.
    pub fn validate(&self) -> WorkfileResult<()> {
        if self.reference_workfile == self.distorted_workfile {
            return Err(WorkfileError::InvalidInput {
                field: "distorted_workfile",
                reason: "must differ from reference_workfile",
                value: Some(self.distorted_workfile.display().to_string()),
            });
        }
        for role in [WorkfileRole::Reference, WorkfileRole::Distorted] {
            let path = self.workfile(role);
            if path.parent().is_none_or(|parent| parent.as_os_str().is_empty()) {
                return Err(WorkfileError::InvalidInput {
                    field: match role {
                        WorkfileRole::Reference => "reference_workfile",
                        WorkfileRole::Distorted => "distorted_workfile",
                    },
                    reason: "must have a parent directory",
                    value: Some(path.display().to_string()),
                });
            }
        }
        Ok(())
    }
}

/// How a single producer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOutcome {
    /// The whole source was delivered.
    Complete {
        /// Bytes written to the workfile.
        bytes: u64,
    },
    /// The reader went away before the source was fully delivered.
    Partial,
}

/// Outcomes for both sides of a released workfile pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    /// Reference side.
    pub reference: ProducerOutcome,
    /// Distorted side.
    pub distorted: ProducerOutcome,
}

impl ProducerReport {
    /// Whether both producers delivered their whole source.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.reference, ProducerOutcome::Complete { .. })
            && matches!(self.distorted, ProducerOutcome::Complete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> WorkfilePlan {
        WorkfilePlan::new(
            "/media/ref.yuv",
            "/media/dis.yuv",
            "/work/VMAF_V1/asset/ref_ref.yuv",
            "/work/VMAF_V1/asset/dis_dis.yuv",
        )
    }

    #[test]
    fn staging_mode_follows_fifo_flag() {
        assert_eq!(StagingMode::from_fifo_flag(true), StagingMode::Fifo);
        assert_eq!(StagingMode::from_fifo_flag(false), StagingMode::Copy);
        assert_eq!(StagingMode::Fifo.as_str(), "fifo");
    }

    #[test]
    fn plan_accessors_select_by_role() {
        let plan = plan();
        assert_eq!(
            plan.source(WorkfileRole::Distorted),
            Path::new("/media/dis.yuv")
        );
        assert_eq!(
            plan.workfile(WorkfileRole::Reference),
            Path::new("/work/VMAF_V1/asset/ref_ref.yuv")
        );
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn validate_rejects_colliding_workfiles() {
        let mut plan = plan();
        plan.distorted_workfile = plan.reference_workfile.clone();
        let err = plan.validate().unwrap_err();
        assert!(matches!(
            err,
            WorkfileError::InvalidInput {
                field: "distorted_workfile",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_bare_file_names() {
        let plan = WorkfilePlan::new("a", "b", "ref.yuv", "/work/dis.yuv");
        assert!(matches!(
            plan.validate(),
            Err(WorkfileError::InvalidInput {
                field: "reference_workfile",
                ..
            })
        ));
    }

    #[test]
    fn report_completeness_requires_both_sides() {
        let report = ProducerReport {
            reference: ProducerOutcome::Complete { bytes: 4 },
            distorted: ProducerOutcome::Partial,
        };
        assert!(!report.is_complete());
    }
}
