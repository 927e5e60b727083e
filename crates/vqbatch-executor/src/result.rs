//! Structured results and the default log grammar.
//!
//! The default grammar reads whitespace-separated `key:value` tokens from the
//! log body and keeps, per key, every value that parses as `f64`, in order.
//! Anything else is ignored, so tool banners and progress lines pass through.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::asset::{Asset, AssetKey};
use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::ExecutorIdentity;
use crate::log_cache::LogFile;

/// Parsed outcome for one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetResult {
    /// Asset the result belongs to.
    pub key: AssetKey,
    /// `{type}_V{version}` of the executor that produced the log.
    pub executor_id: String,
    /// Log the result was derived from.
    pub log_path: PathBuf,
    /// Per-metric score series in log order.
    pub scores: BTreeMap<String, Vec<f64>>,
}

impl AssetResult {
    /// Score series for `metric`.
    #[must_use]
    pub fn series(&self, metric: &str) -> Option<&[f64]> {
        self.scores.get(metric).map(Vec::as_slice)
    }

    /// Arithmetic mean of the `metric` series.
    #[must_use]
    pub fn mean(&self, metric: &str) -> Option<f64> {
        let series = self.series(metric)?;
        if series.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = series.len() as f64;
        Some(series.iter().sum::<f64>() / count)
    }

    /// Names of every metric found in the log.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(String::as_str)
    }
}

/// Collect `key:value` scores from a log body.
#[must_use]
pub fn parse_scores(body: &str) -> BTreeMap<String, Vec<f64>> {
    let mut scores: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for token in body.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        if let Ok(value) = value.parse::<f64>()
            && value.is_finite()
        {
            scores.entry(key.to_string()).or_default().push(value);
        }
    }
    scores
}

/// Derive a result with the default grammar.
///
/// # Errors
///
/// Returns [`ExecutorError::LogIdentityMismatch`] when the log header names an
/// executor other than `identity`.
pub fn parse_default(
    identity: &ExecutorIdentity,
    asset: &Asset,
    log: &LogFile,
) -> ExecutorResult<AssetResult> {
    if !log.is_from(identity) {
        return Err(ExecutorError::LogIdentityMismatch {
            path: log.path.clone(),
            expected: identity.id(),
            found: log.executor_id(),
        });
    }
    Ok(AssetResult {
        key: asset.key(),
        executor_id: identity.id(),
        log_path: log.path.clone(),
        scores: parse_scores(&log.body),
    })
}
