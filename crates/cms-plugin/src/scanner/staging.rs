//! Per-plugin staging areas for nested archives.
//!
//! Each nested plugin gets a private directory under the configured staging
//! root. The sub-archive bytes and anything extracted from them (such as the
//! plugin's dynamic library) live there and are removed when the staged
//! archive is dropped.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::PluginError;

/// Sub-archive bytes written to a private staging directory.
#[derive(Debug)]
pub struct StagedArchive {
    /// Private directory, removed on drop.
    dir: TempDir,
    /// Staged copy of the sub-archive.
    archive_path: PathBuf,
}

impl StagedArchive {
    /// Writes `bytes` into a fresh directory `<root>/<plugin>__<random>/<file_name>`.
    pub fn stage(root: &Path, plugin: &str, file_name: &str, bytes: &[u8]) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{plugin}__"))
            .tempdir_in(root)?;

        let archive_path = dir.path().join(file_name);
        fs::write(&archive_path, bytes)?;

        Ok(Self { dir, archive_path })
    }

    /// Private staging directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Staged sub-archive.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Opens the staged sub-archive.
    pub fn open(&self) -> Result<ZipArchive<File>, PluginError> {
        let file = File::open(&self.archive_path)?;
        Ok(ZipArchive::new(file)?)
    }

    /// Extracts one entry of the sub-archive into the staging directory.
    pub fn extract_entry(&self, entry: &str) -> Result<PathBuf, PluginError> {
        let location = self.archive_path.display().to_string();
        let mut archive = self.open()?;
        let mut file = match archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(PluginError::ArchiveNotFound {
                    location,
                    entry: entry.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let relative = file.enclosed_name().ok_or_else(|| {
            PluginError::class_load(&location, format!("entry '{entry}' escapes the archive"))
        })?;
        let target = self.dir.path().join("extracted").join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;
        Ok(target)
    }
}
