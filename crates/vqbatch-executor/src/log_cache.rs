//! On-disk log cache keyed by executor identity and asset identity.
//!
//! # Design
//! - The final log path is a pure function of the cache root, the executor id,
//!   and the asset identity string.
//! - A file at the final path means a finished run: logs are written to a
//!   pending sibling and renamed into place only after the backend succeeded.
//! - The header is re-checked on lookup; a log from another executor version,
//!   or one missing the blank line after its header, is stale and gets
//!   regenerated.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::asset::Asset;
use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::{ExecutorIdentity, parse_header};

/// Cache state of one asset's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheStatus {
    /// A finished log from this executor exists.
    Hit {
        /// Final log path.
        path: PathBuf,
    },
    /// No log exists yet.
    Missing {
        /// Final log path.
        path: PathBuf,
    },
    /// A log exists but its header names another executor.
    Stale {
        /// Final log path.
        path: PathBuf,
        /// Header line found in the file.
        found: String,
    },
}

impl CacheStatus {
    /// Whether the log can be reused.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// Final log path regardless of state.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Hit { path } | Self::Missing { path } | Self::Stale { path, .. } => path,
        }
    }
}

/// A parsed log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// Where the log was read from.
    pub path: PathBuf,
    /// Executor type recorded in the header.
    pub executor_type: String,
    /// Executor version recorded in the header.
    pub executor_version: String,
    /// Backend output following the blank separator line.
    pub body: String,
}

impl LogFile {
    /// Whether the header names `identity`.
    #[must_use]
    pub fn is_from(&self, identity: &ExecutorIdentity) -> bool {
        self.executor_type == identity.executor_type() && self.executor_version == identity.version()
    }

    /// `{type}_V{version}` as recorded in the header.
    #[must_use]
    pub fn executor_id(&self) -> String {
        format!("{}_V{}", self.executor_type, self.executor_version)
    }

    fn parse(path: &Path, contents: &str) -> ExecutorResult<Self> {
        let malformed = |reason| ExecutorError::LogFormat {
            path: path.to_path_buf(),
            reason,
        };
        let (header, rest) = contents
            .split_once('\n')
            .ok_or_else(|| malformed("missing header line"))?;
        let (executor_type, executor_version) =
            parse_header(header).ok_or_else(|| malformed("malformed header line"))?;
        let body = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .ok_or_else(|| malformed("missing blank line after header"))?;

        Ok(Self {
            path: path.to_path_buf(),
            executor_type: executor_type.to_string(),
            executor_version: executor_version.to_string(),
            body: body.to_string(),
        })
    }
}

/// Maps `(executor, asset)` pairs to log files under one root directory.
#[derive(Debug, Clone)]
pub struct LogCache {
    root: PathBuf,
}

impl LogCache {
    /// Cache rooted at `root`; nothing is created until a log is begun.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final log path for `asset` under `identity`.
    #[must_use]
    pub fn path_for(&self, identity: &ExecutorIdentity, asset: &Asset) -> PathBuf {
        self.root.join(identity.id()).join(asset.identity_string())
    }

    /// Classify the log for `asset` without modifying anything.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing log cannot be read.
    pub fn lookup(&self, identity: &ExecutorIdentity, asset: &Asset) -> ExecutorResult<CacheStatus> {
        let path = self.path_for(identity, asset);
        if !path.is_file() {
            return Ok(CacheStatus::Missing { path });
        }
        let (header, separated) = match read_header(&path) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(CacheStatus::Missing { path });
            }
            Err(err) => return Err(ExecutorError::io("log_cache.lookup", path, err)),
        };
        if separated && identity.matches_header(&header) {
            Ok(CacheStatus::Hit { path })
        } else {
            Ok(CacheStatus::Stale {
                path,
                found: header,
            })
        }
    }

    /// Start a fresh log for `asset`: the header is written to a pending
    /// sibling file that the backend appends to.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or pending file cannot be created.
    pub fn begin(&self, identity: &ExecutorIdentity, asset: &Asset) -> ExecutorResult<PendingLog> {
        let final_path = self.path_for(identity, asset);
        let parent = final_path
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        fs::create_dir_all(&parent)
            .map_err(|err| ExecutorError::io("log_cache.create_dir", &parent, err))?;

        let pending_path = parent.join(format!(".{}.pending", Uuid::new_v4()));
        let mut file = File::create(&pending_path)
            .map_err(|err| ExecutorError::io("log_cache.create_pending", &pending_path, err))?;
        let pending = PendingLog {
            pending_path,
            final_path,
            settled: false,
        };
        write!(file, "{}\n\n", identity.header_line())
            .and_then(|()| file.flush())
            .map_err(|err| ExecutorError::io("log_cache.write_header", pending.path(), err))?;

        debug!(pending = %pending.path().display(), "began pending log");
        Ok(pending)
    }

    /// Read and parse the log at `path`; relative paths resolve against the
    /// cache root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid log.
    pub fn read(&self, path: &Path) -> ExecutorResult<LogFile> {
        let path = if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        };
        let contents = fs::read_to_string(&path)
            .map_err(|err| ExecutorError::io("log_cache.read", &path, err))?;
        LogFile::parse(&path, &contents)
    }

    /// Delete the log for `asset`; returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error for any removal failure other than not-found.
    pub fn remove(&self, identity: &ExecutorIdentity, asset: &Asset) -> ExecutorResult<bool> {
        let path = self.path_for(identity, asset);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ExecutorError::io("log_cache.remove", path, err)),
        }
    }
}

/// A log being produced. It only becomes visible at its final path on
/// [`PendingLog::commit`]; dropping it removes the pending file.
#[derive(Debug)]
pub struct PendingLog {
    pending_path: PathBuf,
    final_path: PathBuf,
    settled: bool,
}

impl PendingLog {
    /// Path the backend should append to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.pending_path
    }

    /// Path the log will have once committed.
    #[must_use]
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Atomically move the log to its final path.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the pending file is then removed.
    pub fn commit(mut self) -> ExecutorResult<PathBuf> {
        fs::rename(&self.pending_path, &self.final_path)
            .map_err(|err| ExecutorError::io("log_cache.commit", &self.final_path, err))?;
        self.settled = true;
        debug!(path = %self.final_path.display(), "committed log");
        Ok(self.final_path.clone())
    }

    /// Remove the pending file without publishing it.
    ///
    /// # Errors
    ///
    /// Returns an error for any removal failure other than not-found.
    pub fn discard(mut self) -> ExecutorResult<()> {
        self.settled = true;
        match fs::remove_file(&self.pending_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ExecutorError::io(
                "log_cache.discard",
                &self.pending_path,
                err,
            )),
        }
    }
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Err(err) = fs::remove_file(&self.pending_path)
            && err.kind() != io::ErrorKind::NotFound
        {
            debug!(
                error = %err,
                pending = %self.pending_path.display(),
                "failed to remove abandoned pending log"
            );
        }
    }
}

/// First line of the log, and whether a blank separator line follows it.
fn read_header(path: &Path) -> io::Result<(String, bool)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let mut separator = String::new();
    let terminated = header.ends_with('\n');
    if terminated {
        reader.read_line(&mut separator)?;
    }
    let separated = terminated && matches!(separator.as_str(), "\n" | "\r\n");
    Ok((header.trim_end_matches(['\n', '\r']).to_string(), separated))
}
