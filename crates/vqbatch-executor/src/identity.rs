//! Executor identity: the `(type, version)` pair every backend declares.

use std::fmt;

use serde::Serialize;

use crate::error::{ExecutorError, ExecutorResult};

const HEADER_SEPARATOR: &str = " VERSION ";

/// Type and version of the backend producing logs.
///
/// Both parts become path components and are restricted to
/// `[A-Za-z0-9._-]`, excluding `.` and `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExecutorIdentity {
    executor_type: String,
    version: String,
}

impl ExecutorIdentity {
    /// Validate and build an identity.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidIdentity`] when either part is empty or
    /// contains characters outside the allowed set.
    pub fn new(executor_type: impl Into<String>, version: impl Into<String>) -> ExecutorResult<Self> {
        let executor_type = executor_type.into();
        let version = version.into();
        ensure_token("executor_type", &executor_type)?;
        ensure_token("executor_version", &version)?;
        Ok(Self {
            executor_type,
            version,
        })
    }

    /// Executor type, e.g. `VMAF`.
    #[must_use]
    pub fn executor_type(&self) -> &str {
        &self.executor_type
    }

    /// Executor version, e.g. `0.3.1`.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `{type}_V{version}`: the directory name logs and workfiles live under.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_V{}", self.executor_type, self.version)
    }

    /// First line of every log this executor writes.
    #[must_use]
    pub fn header_line(&self) -> String {
        format!("{}{HEADER_SEPARATOR}{}", self.executor_type, self.version)
    }

    /// Whether `line` is exactly this identity's header line.
    #[must_use]
    pub fn matches_header(&self, line: &str) -> bool {
        parse_header(line).is_some_and(|(executor_type, version)| {
            executor_type == self.executor_type && version == self.version
        })
    }
}

impl fmt::Display for ExecutorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_V{}", self.executor_type, self.version)
    }
}

/// Split a header line into `(type, version)`.
pub(crate) fn parse_header(line: &str) -> Option<(&str, &str)> {
    let (executor_type, version) = line.trim_end_matches('\r').split_once(HEADER_SEPARATOR)?;
    if executor_type.is_empty() || version.is_empty() {
        return None;
    }
    Some((executor_type, version))
}

fn ensure_token(field: &'static str, value: &str) -> ExecutorResult<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ExecutorError::InvalidIdentity {
            field,
            value: value.to_string(),
        })
    }
}
