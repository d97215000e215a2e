//! Manifest carried by every nested plugin archive.

use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::PluginError;

/// Location of the manifest inside a nested plugin archive.
pub const MANIFEST_PATH: &str = "META-INF/plugin.toml";

/// Largest accepted manifest, in bytes.
const MAX_MANIFEST_SIZE: u64 = 64 * 1024;

/// Identity and load instructions of a nested plugin.
///
/// ```toml
/// name = "sample-plugin"
/// version = "1.0"
/// library = "native/libsample_plugin.so"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name; must match the archive file name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Path of the platform dynamic library inside the archive, if any.
    #[serde(default)]
    pub library: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl PluginManifest {
    /// Parses a manifest document.
    pub fn parse(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Reads and parses the manifest of an opened plugin archive.
    pub fn read_from<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        location: &str,
    ) -> Result<Self, PluginError> {
        let mut entry = match archive.by_name(MANIFEST_PATH) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(PluginError::ArchiveNotFound {
                    location: location.to_string(),
                    entry: MANIFEST_PATH.to_string(),
                });
            }
            Err(e) => return Err(PluginError::class_load(location, e.to_string())),
        };

        let mut source = String::new();
        entry
            .by_ref()
            .take(MAX_MANIFEST_SIZE + 1)
            .read_to_string(&mut source)
            .map_err(|e| PluginError::class_load(location, format!("unreadable manifest: {e}")))?;
        if source.len() as u64 > MAX_MANIFEST_SIZE {
            return Err(PluginError::class_load(
                location,
                format!("manifest exceeds {MAX_MANIFEST_SIZE} bytes"),
            ));
        }

        Self::parse(&source)
            .map_err(|e| PluginError::class_load(location, format!("invalid manifest: {e}")))
    }
}
