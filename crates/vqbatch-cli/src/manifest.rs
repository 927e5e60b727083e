//! Asset manifest loading.
//!
//! A manifest names one dataset and lists its assets. JSON manifests are read
//! as the YAML subset they are. Relative media paths resolve against the
//! manifest's directory, and per-asset sizes fall back to the manifest's
//! `quality_size`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use vqbatch_executor::{Asset, Dimensions};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    dataset: String,
    #[serde(default)]
    quality_size: Option<Dimensions>,
    assets: Vec<ManifestAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestAsset {
    content_id: u64,
    asset_id: u64,
    reference_path: PathBuf,
    distorted_path: PathBuf,
    #[serde(default)]
    quality_size: Option<Dimensions>,
    #[serde(default)]
    reference_size: Option<Dimensions>,
    #[serde(default)]
    distorted_size: Option<Dimensions>,
}

/// Read the manifest at `path` into assets, in file order.
pub(crate) fn load_manifest(path: &Path) -> Result<Vec<Asset>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse_manifest(&contents, base)
        .with_context(|| format!("invalid manifest {}", path.display()))
}

pub(crate) fn parse_manifest(contents: &str, base: &Path) -> Result<Vec<Asset>> {
    let manifest: Manifest = serde_yaml::from_str(contents)?;
    manifest
        .assets
        .into_iter()
        .map(|entry| {
            let quality_size = entry.quality_size.or(manifest.quality_size).ok_or_else(|| {
                anyhow!(
                    "asset {}/{} has no quality_size and the manifest sets none",
                    entry.content_id,
                    entry.asset_id
                )
            })?;
            Ok(Asset {
                dataset: manifest.dataset.clone(),
                content_id: entry.content_id,
                asset_id: entry.asset_id,
                reference_path: base.join(entry.reference_path),
                distorted_path: base.join(entry.distorted_path),
                quality_size,
                reference_size: entry.reference_size.unwrap_or(quality_size),
                distorted_size: entry.distorted_size.unwrap_or(quality_size),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_manifest_applies_defaults_and_base_dir() -> Result<()> {
        let assets = parse_manifest(
            r"
dataset: example
quality_size: { width: 1920, height: 1080 }
assets:
  - content_id: 0
    asset_id: 0
    reference_path: ref/src01.yuv
    distorted_path: /abs/dis01.yuv
  - content_id: 0
    asset_id: 1
    reference_path: ref/src01.yuv
    distorted_path: dis/dis02.yuv
    distorted_size: { width: 1280, height: 720 }
",
            Path::new("/data"),
        )?;
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].reference_path, PathBuf::from("/data/ref/src01.yuv"));
        assert_eq!(assets[0].distorted_path, PathBuf::from("/abs/dis01.yuv"));
        assert_eq!(assets[0].reference_size, Dimensions::new(1920, 1080));
        assert_eq!(assets[1].distorted_size, Dimensions::new(1280, 720));
        assert_eq!(assets[1].dataset, "example");
        Ok(())
    }

    #[test]
    fn json_manifest_is_accepted() -> Result<()> {
        let assets = parse_manifest(
            r#"{"dataset":"example","assets":[{"content_id":2,"asset_id":3,
                "reference_path":"r.yuv","distorted_path":"d.yuv",
                "quality_size":{"width":32,"height":18}}]}"#,
            Path::new(""),
        )?;
        assert_eq!(assets[0].key().to_string(), "example/2/3");
        assert_eq!(assets[0].quality_size, Dimensions::new(32, 18));
        Ok(())
    }

    #[test]
    fn missing_quality_size_is_rejected() {
        let err = parse_manifest(
            "dataset: example\nassets:\n  - {content_id: 0, asset_id: 0, reference_path: r, distorted_path: d}\n",
            Path::new(""),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no quality_size"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(
            parse_manifest(
                "dataset: example\nassets: []\nextra: 1\n",
                Path::new("")
            )
            .is_err()
        );
    }

    #[test]
    fn load_manifest_reports_missing_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = load_manifest(&temp.path().join("absent.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read manifest"));
        Ok(())
    }
}
