//! Asset model and identity encoding.
//!
//! # Design
//! - An asset is plain data owned by the caller; the pipeline only reads it.
//! - The identity string is a pure function of the asset and safe to use as a
//!   single path component. A readable, sanitised prefix is capped in length
//!   and followed by a digest of the raw fields, so distinct assets never
//!   share a string even when their readable parts sanitise alike.
//! - Shape checks live behind [`Asset::validate`] so further checks slot in.

use std::ffi::OsStr;
use std::fmt::{self, Write as _};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ExecutorError, ExecutorResult};

/// Width and height of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dimensions {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Build a dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The identity triple that must be unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    /// Dataset the asset belongs to.
    pub dataset: String,
    /// Content (source clip) identifier.
    pub content_id: u64,
    /// Asset identifier within the content.
    pub asset_id: u64,
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dataset, self.content_id, self.asset_id)
    }
}

/// One unit of work: a reference/distorted media pair plus its geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Asset {
    /// Dataset the asset belongs to.
    pub dataset: String,
    /// Content (source clip) identifier.
    pub content_id: u64,
    /// Asset identifier within the content.
    pub asset_id: u64,
    /// Reference media, already in the backend's raw pixel format.
    pub reference_path: PathBuf,
    /// Distorted media, already in the backend's raw pixel format.
    pub distorted_path: PathBuf,
    /// Dimensions the backend evaluates at.
    pub quality_size: Dimensions,
    /// Dimensions of the reference media.
    pub reference_size: Dimensions,
    /// Dimensions of the distorted media.
    pub distorted_size: Dimensions,
}

impl Asset {
    /// Build an asset whose three dimension pairs are all `size`.
    #[must_use]
    pub fn new(
        dataset: impl Into<String>,
        content_id: u64,
        asset_id: u64,
        reference_path: impl Into<PathBuf>,
        distorted_path: impl Into<PathBuf>,
        size: Dimensions,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            content_id,
            asset_id,
            reference_path: reference_path.into(),
            distorted_path: distorted_path.into(),
            quality_size: size,
            reference_size: size,
            distorted_size: size,
        }
    }

    /// Identity triple of this asset.
    #[must_use]
    pub fn key(&self) -> AssetKey {
        AssetKey {
            dataset: self.dataset.clone(),
            content_id: self.content_id,
            asset_id: self.asset_id,
        }
    }

    /// Deterministic, path-safe encoding of the identity and parameterisation.
    ///
    /// Layout: `{readable}_{digest}`, where `readable` is
    /// `{dataset}_{content_id}_{asset_id}_{ref_stem}_{ref_size}_vs_{dis_stem}_{dis_size}_q_{quality_size}`
    /// cut to [`MAX_READABLE_LEN`] bytes and `digest` is 16 hex digits over
    /// the unsanitised fields.
    #[must_use]
    pub fn identity_string(&self) -> String {
        let mut readable = format!(
            "{}_{}_{}_{}_{}_vs_{}_{}_q_{}",
            sanitize(&self.dataset),
            self.content_id,
            self.asset_id,
            sanitize(&stem(&self.reference_path)),
            self.reference_size,
            sanitize(&stem(&self.distorted_path)),
            self.distorted_size,
            self.quality_size,
        );
        readable.truncate(MAX_READABLE_LEN);
        format!("{readable}_{}", self.identity_digest())
    }

    fn identity_digest(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(self.dataset.as_bytes());
        field(&self.content_id.to_le_bytes());
        field(&self.asset_id.to_le_bytes());
        field(raw_stem(&self.reference_path));
        field(raw_stem(&self.distorted_path));
        for size in [self.reference_size, self.distorted_size, self.quality_size] {
            field(&size.width.to_le_bytes());
            field(&size.height.to_le_bytes());
        }
        let digest = hasher.finalize();
        digest[..DIGEST_BYTES]
            .iter()
            .fold(String::with_capacity(DIGEST_BYTES * 2), |mut hex, byte| {
                let _ = write!(hex, "{byte:02x}");
                hex
            })
    }

    /// File name of the reference media, sanitised for reuse in workfile names.
    #[must_use]
    pub fn reference_file_name(&self) -> String {
        keep_tail(sanitize(&file_name(&self.reference_path)), MAX_FILE_NAME_LEN)
    }

    /// File name of the distorted media, sanitised for reuse in workfile names.
    #[must_use]
    pub fn distorted_file_name(&self) -> String {
        keep_tail(sanitize(&file_name(&self.distorted_path)), MAX_FILE_NAME_LEN)
    }

    /// Check per-asset invariants before any work is done for it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ShapeMismatch`] when the reference or distorted
    /// dimensions differ from the quality dimensions.
    pub fn validate(&self) -> ExecutorResult<()> {
        for (field, actual) in [
            ("reference_size", self.reference_size),
            ("distorted_size", self.distorted_size),
        ] {
            if actual != self.quality_size {
                return Err(ExecutorError::ShapeMismatch {
                    key: self.key(),
                    field,
                    expected: self.quality_size,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Byte cap on the readable part of an identity string; the full string
/// stays well inside the 255-byte file name limit.
pub const MAX_READABLE_LEN: usize = 160;

/// Byte cap on sanitised media file names reused in workfile names.
const MAX_FILE_NAME_LEN: usize = 200;

const DIGEST_BYTES: usize = 8;

fn raw_stem(path: &Path) -> &[u8] {
    path.file_stem().map(OsStr::as_bytes).unwrap_or_default()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "unnamed".to_string(), |s| s.to_string_lossy().into_owned())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "unnamed".to_string(), |s| s.to_string_lossy().into_owned())
}

/// Keep the last `max` bytes so the extension survives.
fn keep_tail(mut value: String, max: usize) -> String {
    if value.len() > max {
        value.drain(..value.len() - max);
    }
    value
}

fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Asset {
        Asset {
            dataset: "example".to_string(),
            content_id: 0,
            asset_id: 1,
            reference_path: PathBuf::from("/media/src01_hrc00_576x324.yuv"),
            distorted_path: PathBuf::from("/media/src01_hrc01_576x324.yuv"),
            quality_size: Dimensions::new(576, 324),
            reference_size: Dimensions::new(576, 324),
            distorted_size: Dimensions::new(576, 324),
        }
    }

    #[test]
    fn identity_string_encodes_identity_and_geometry() {
        let id = sample().identity_string();
        let (readable, digest) = id.rsplit_once('_').unwrap_or_default();
        assert_eq!(
            readable,
            "example_0_1_src01_hrc00_576x324_576x324_vs_src01_hrc01_576x324_576x324_q_576x324"
        );
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, sample().identity_string());
    }

    #[test]
    fn lookalike_identities_get_distinct_strings() {
        let mut slash = sample();
        slash.dataset = "a/b".to_string();
        let mut dash = sample();
        dash.dataset = "a-b".to_string();
        assert_ne!(slash.identity_string(), dash.identity_string());

        let mut left = sample();
        left.dataset = "x_1".to_string();
        left.content_id = 2;
        left.asset_id = 3;
        left.reference_path = PathBuf::from("/media/r.yuv");
        let mut right = sample();
        right.dataset = "x".to_string();
        right.content_id = 1;
        right.asset_id = 2;
        right.reference_path = PathBuf::from("/media/3_r.yuv");
        assert_ne!(left.identity_string(), right.identity_string());
    }

    #[test]
    fn long_names_stay_within_file_name_limits() {
        let mut asset = sample();
        asset.dataset = "d".repeat(300);
        asset.reference_path = PathBuf::from(format!("/media/{}.yuv", "r".repeat(250)));
        let id = asset.identity_string();
        assert!(id.len() <= MAX_READABLE_LEN + 17);
        assert!(asset.reference_file_name().len() <= MAX_FILE_NAME_LEN);
        assert!(asset.reference_file_name().ends_with(".yuv"));

        let mut other = asset.clone();
        other.dataset.push('e');
        assert_ne!(id, other.identity_string());
    }

    #[test]
    fn identity_string_is_path_safe() {
        let mut asset = sample();
        asset.dataset = "../evil/set name".to_string();
        let id = asset.identity_string();
        assert!(!id.contains('/'));
        assert!(!id.contains(' '));
        assert!(id.starts_with("..-evil-set-name_0_1_"));
    }

    #[test]
    fn identity_string_changes_with_geometry() {
        let mut other = sample();
        other.quality_size = Dimensions::new(1920, 1080);
        assert_ne!(sample().identity_string(), other.identity_string());
    }

    #[test]
    fn validate_accepts_matching_shapes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_mismatched_distorted_shape() {
        let mut asset = sample();
        asset.distorted_size = Dimensions::new(1920, 1080);
        let err = asset.validate().unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::ShapeMismatch {
                field: "distorted_size",
                ..
            }
        ));
    }

    #[test]
    fn file_names_are_sanitised() {
        let mut asset = sample();
        asset.reference_path = PathBuf::from("/media/with space.yuv");
        assert_eq!(asset.reference_file_name(), "with-space.yuv");
        assert_eq!(asset.distorted_file_name(), "src01_hrc01_576x324.yuv");
    }

    #[test]
    fn key_displays_as_triple() {
        assert_eq!(sample().key().to_string(), "example/0/1");
    }
}
