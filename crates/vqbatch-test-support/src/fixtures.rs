//! Sandbox directories and sample media.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;
use vqbatch_config::PipelineSettings;
use vqbatch_executor::{Asset, Dimensions};

/// Default frame size used by sample assets.
pub const SAMPLE_SIZE: Dimensions = Dimensions::new(32, 18);

/// A temporary tree with `media/`, `logs/` and `work/` directories.
pub struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    /// Create a fresh sandbox with an empty `media/` directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("media"))?;
        Ok(Self { temp })
    }

    /// Root of the sandbox.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Directory holding source media.
    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.root().join("media")
    }

    /// Log cache root.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root().join("logs")
    }

    /// Workfile root.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.root().join("work")
    }

    /// Pipeline settings pointing at this sandbox: copy mode, workfiles kept,
    /// one asset at a time. Tests opt into the rest explicitly.
    #[must_use]
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings::new(self.log_dir(), self.work_dir())
            .with_fifo_mode(false)
            .with_delete_workdir(false)
    }

    /// Write `len` bytes of deterministic media named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_media(&self, name: &str, len: usize, seed: u8) -> Result<PathBuf> {
        let path = self.media_dir().join(name);
        fs::write(&path, sample_bytes(len, seed))?;
        Ok(path)
    }

    /// Write a reference/distorted pair and describe it as an asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the media cannot be written.
    pub fn asset(&self, dataset: &str, content_id: u64, asset_id: u64) -> Result<Asset> {
        let reference = self.write_media(&format!("src{content_id:02}_ref.yuv"), 4096, 1)?;
        let distorted = self.write_media(
            &format!("src{content_id:02}_dis_{asset_id:02}.yuv"),
            3072,
            2,
        )?;
        Ok(Asset::new(
            dataset,
            content_id,
            asset_id,
            reference,
            distorted,
            SAMPLE_SIZE,
        ))
    }

    /// Every regular file or pipe below the workfile root.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed.
    pub fn workfiles(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        collect_files(&self.work_dir(), &mut found)?;
        found.sort();
        Ok(found)
    }
}

/// Deterministic byte pattern for sample media.
#[must_use]
pub fn sample_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|index| {
            #[allow(clippy::cast_possible_truncation)]
            let low = index as u8;
            low.wrapping_mul(31).wrapping_add(seed)
        })
        .collect()
}

fn collect_files(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, found)?;
        } else {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_assets_share_reference_media() -> Result<()> {
        let sandbox = Sandbox::new()?;
        let first = sandbox.asset("example", 0, 1)?;
        let second = sandbox.asset("example", 0, 2)?;
        assert_eq!(first.reference_path, second.reference_path);
        assert_ne!(first.distorted_path, second.distorted_path);
        assert_eq!(fs::read(&first.reference_path)?.len(), 4096);
        Ok(())
    }

    #[test]
    fn workfiles_is_empty_without_a_work_dir() -> Result<()> {
        let sandbox = Sandbox::new()?;
        assert!(sandbox.workfiles()?.is_empty());
        fs::create_dir_all(sandbox.work_dir().join("a/b"))?;
        fs::write(sandbox.work_dir().join("a/b/file"), b"x")?;
        assert_eq!(sandbox.workfiles()?, vec![sandbox.work_dir().join("a/b/file")]);
        Ok(())
    }

    #[test]
    fn sample_bytes_depend_on_seed() {
        assert_ne!(sample_bytes(8, 1), sample_bytes(8, 2));
        assert_eq!(sample_bytes(300, 0).len(), 300);
    }
}
