//! Discovery of plugin units.
//!
//! Two layouts are supported and may be combined:
//!
//! - **Flat**: beans compiled into the host and listed in its registration
//!   table. They are discovered first, in registration order.
//! - **Nested**: sub-archives stored under the library segment of the host
//!   package (`lib/<name>-<version>.jar`). They follow, ordered by entry path
//!   so that repeated boots see the same sequence.
//!
//! A unit that cannot be read or loaded becomes a `Failed` descriptor and the
//! scan moves on.

pub mod manifest;
pub mod naming;
pub mod staging;

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use cms_core::config::PluginsConfig;

use crate::descriptor::{PluginDescriptor, SourceKind};
use crate::error::PluginError;
use crate::loader::{LoadHandle, ModuleLoader, NestedUnit, StaticModuleLoader};
use crate::traits::DeployBean;

use self::manifest::PluginManifest;
use self::naming::{NamingConvention, NestedArchiveName};
use self::staging::StagedArchive;

/// The host's own distributable package.
#[derive(Debug, Clone, Default)]
pub enum HostPackage {
    /// No package; only the flat layout is scanned.
    #[default]
    None,
    /// Package file on disk.
    File(PathBuf),
    /// Package already held in memory.
    Memory {
        /// Name used in locations and logs.
        label: String,
        /// Package bytes.
        bytes: Bytes,
    },
}

impl HostPackage {
    /// Package configured under `plugins.host_package`.
    pub fn from_config(config: &PluginsConfig) -> Self {
        match &config.host_package {
            Some(path) => Self::File(path.clone()),
            None => Self::None,
        }
    }

    /// Name used in locations and logs.
    pub fn label(&self) -> String {
        match self {
            Self::None => "<none>".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Memory { label, .. } => label.clone(),
        }
    }
}

/// A raw entry read out of the host package.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the host package.
    pub path: String,
    /// Entry bytes.
    pub bytes: Bytes,
}

/// Where and how nested plugins are looked up.
#[derive(Debug, Clone)]
pub struct ScannerOptions {
    /// Naming convention of nested archives.
    pub naming: NamingConvention,
    /// Root of the per-plugin staging directories.
    pub staging_dir: PathBuf,
    /// Largest nested archive read into memory, in bytes.
    pub max_entry_size: u64,
}

impl ScannerOptions {
    /// Options from the plugin configuration section.
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self {
            naming: NamingConvention::new(&config.library_segment, &config.archive_extensions),
            staging_dir: config.staging_dir.clone(),
            max_entry_size: config.threshold_size,
        }
    }
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self::from_config(&PluginsConfig::default())
    }
}

/// A bean from the host's registration table.
#[derive(Debug)]
struct FlatEntry {
    bean: Arc<dyn DeployBean>,
    location: String,
}

/// Locates plugin units and loads each one in isolation.
#[derive(Debug)]
pub struct ArchiveScanner {
    options: ScannerOptions,
    flat: Vec<FlatEntry>,
    loader: Arc<dyn ModuleLoader>,
}

impl ArchiveScanner {
    /// Creates a scanner with an empty registration table and a static loader
    /// that knows no plugins.
    pub fn new(options: ScannerOptions) -> Self {
        Self {
            options,
            flat: Vec::new(),
            loader: Arc::new(StaticModuleLoader::new()),
        }
    }

    /// Adds a compiled-in bean to the flat registration table.
    pub fn register<B>(mut self, bean: B) -> Self
    where
        B: DeployBean + 'static,
    {
        self.flat.push(FlatEntry {
            location: std::any::type_name::<B>().to_string(),
            bean: Arc::new(bean),
        });
        self
    }

    /// Sets the loader used for nested archives.
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Discovers every plugin unit: flat entries first, then nested archives.
    pub fn discover(&self, package: &HostPackage) -> Vec<PluginDescriptor> {
        let mut descriptors: Vec<PluginDescriptor> = self
            .flat
            .iter()
            .map(|entry| {
                debug!(plugin = %entry.bean.name(), location = %entry.location, "Flat plugin discovered");
                PluginDescriptor::discovered(
                    entry.bean.name(),
                    entry.bean.version().map(str::to_string),
                    SourceKind::Flat,
                    entry.location.clone(),
                    LoadHandle::flat(Arc::clone(&entry.bean)),
                )
            })
            .collect();

        descriptors.extend(self.discover_nested(package));

        info!(
            package = %package.label(),
            count = descriptors.len(),
            "Plugin discovery finished"
        );
        descriptors
    }

    fn discover_nested(&self, package: &HostPackage) -> Vec<PluginDescriptor> {
        let label = package.label();
        let scanned = match package {
            HostPackage::None => return Vec::new(),
            HostPackage::File(path) => File::open(path)
                .map_err(PluginError::from)
                .and_then(|file| Ok(ZipArchive::new(file)?))
                .map(|mut archive| self.scan_archive(&mut archive, &label)),
            HostPackage::Memory { bytes, .. } => ZipArchive::new(Cursor::new(bytes.clone()))
                .map_err(PluginError::from)
                .map(|mut archive| self.scan_archive(&mut archive, &label)),
        };

        match scanned {
            Ok(descriptors) => descriptors,
            Err(e) => {
                error!(package = %label, error = %e, "Failed to open host package, nested plugins skipped");
                Vec::new()
            }
        }
    }

    fn scan_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        label: &str,
    ) -> Vec<PluginDescriptor> {
        let mut candidates: Vec<(String, NestedArchiveName)> = archive
            .file_names()
            .filter_map(|path| {
                self.options
                    .naming
                    .matches(path)
                    .map(|parsed| (path.to_string(), parsed))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        candidates
            .into_iter()
            .map(|(path, parsed)| {
                let location = format!("{label}!/{path}");
                let loaded = read_entry(archive, &path, &location, self.options.max_entry_size)
                    .and_then(|entry| self.load_nested(&entry, &parsed, &location));

                match loaded {
                    Ok((handle, version)) => {
                        info!(plugin = %parsed.name, version = %version, location = %location, "Nested plugin discovered");
                        PluginDescriptor::discovered(
                            parsed.name,
                            Some(version),
                            SourceKind::NestedArchive,
                            location,
                            handle,
                        )
                    }
                    Err(e) => {
                        warn!(plugin = %parsed.name, location = %location, error = %e, "Nested plugin could not be loaded");
                        PluginDescriptor::failed(
                            parsed.name,
                            Some(parsed.version),
                            SourceKind::NestedArchive,
                            location,
                            &e,
                        )
                    }
                }
            })
            .collect()
    }

    fn load_nested(
        &self,
        entry: &ArchiveEntry,
        parsed: &NestedArchiveName,
        location: &str,
    ) -> Result<(LoadHandle, String), PluginError> {
        let mut sub_archive = ZipArchive::new(Cursor::new(entry.bytes.clone()))
            .map_err(|e| PluginError::class_load(location, format!("not a plugin archive: {e}")))?;

        let manifest = PluginManifest::read_from(&mut sub_archive, location)?;
        if manifest.name != parsed.name {
            return Err(PluginError::class_load(
                location,
                format!(
                    "manifest names plugin '{}' but the archive is named '{}'",
                    manifest.name, parsed.name
                ),
            ));
        }

        let staged = StagedArchive::stage(
            &self.options.staging_dir,
            &parsed.name,
            &parsed.file_name,
            &entry.bytes,
        )
        .map_err(|e| PluginError::class_load(location, format!("staging failed: {e}")))?;

        let unit = NestedUnit {
            name: &parsed.name,
            version: &manifest.version,
            location,
            manifest: &manifest,
            staged: &staged,
        };
        let module = self.loader.load(&unit)?.ok_or_else(|| {
            PluginError::class_load(location, "no module loader provides this plugin")
        })?;

        if module.bean.name() != parsed.name {
            return Err(PluginError::class_load(
                location,
                format!(
                    "loaded bean is named '{}', expected '{}'",
                    module.bean.name(),
                    parsed.name
                ),
            ));
        }

        Ok((LoadHandle::nested(module, staged), manifest.version))
    }
}

/// Reads one entry of the host package into memory.
///
/// The size recorded in the entry header is not trusted: at most `limit`
/// bytes are read and a longer entry is rejected as corrupt.
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
    location: &str,
    limit: u64,
) -> Result<ArchiveEntry, PluginError> {
    let file = archive.by_name(path).map_err(|_| PluginError::ArchiveNotFound {
        location: location.to_string(),
        entry: path.to_string(),
    })?;

    let mut buffer = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut buffer)
        .map_err(|e| PluginError::class_load(location, format!("unreadable archive entry: {e}")))?;
    if buffer.len() as u64 > limit {
        return Err(PluginError::class_load(
            location,
            format!("archive entry exceeds {limit} bytes"),
        ));
    }

    Ok(ArchiveEntry {
        path: path.to_string(),
        bytes: Bytes::from(buffer),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use async_trait::async_trait;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::descriptor::PluginStatus;
    use crate::error::FailureReason;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl DeployBean for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn options(root: &std::path::Path) -> ScannerOptions {
        ScannerOptions {
            naming: NamingConvention::new("lib", &["jar".to_string()]),
            staging_dir: root.to_path_buf(),
            ..ScannerOptions::default()
        }
    }

    #[test]
    fn test_flat_beans_keep_registration_order() {
        let root = tempfile::tempdir().unwrap();
        let scanner = ArchiveScanner::new(options(root.path()))
            .register(Named("zeta"))
            .register(Named("alpha"));

        let found = scanner.discover(&HostPackage::None);
        let names: Vec<&str> = found.iter().map(PluginDescriptor::name).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert!(found.iter().all(|d| d.source() == SourceKind::Flat));
    }

    #[test]
    fn test_manifest_name_mismatch_is_class_load() {
        let root = tempfile::tempdir().unwrap();
        let plugin = zip_bytes(&[("META-INF/plugin.toml", b"name = \"other\"\nversion = \"1.0\"\n")]);
        let host = zip_bytes(&[("lib/sample-1.0.jar", &plugin)]);

        let scanner = ArchiveScanner::new(options(&root.path().join("staging")))
            .with_loader(StaticModuleLoader::new().with("sample", || Arc::new(Named("sample"))));
        let found = scanner.discover(&HostPackage::Memory {
            label: "host.zip".into(),
            bytes: Bytes::from(host),
        });

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status(), PluginStatus::Failed);
        assert_eq!(found[0].failure().unwrap().reason, FailureReason::ClassLoad);
    }

    #[test]
    fn test_missing_manifest_is_archive_not_found() {
        let root = tempfile::tempdir().unwrap();
        let plugin = zip_bytes(&[("README", b"no manifest")]);
        let host = zip_bytes(&[("lib/sample-1.0.jar", &plugin)]);

        let scanner = ArchiveScanner::new(options(root.path()));
        let found = scanner.discover(&HostPackage::Memory {
            label: "host.zip".into(),
            bytes: Bytes::from(host),
        });

        assert_eq!(found[0].failure().unwrap().reason, FailureReason::ArchiveNotFound);
        assert_eq!(found[0].location(), "host.zip!/lib/sample-1.0.jar");
    }

    #[test]
    fn test_unreadable_host_package_yields_flat_only() {
        let root = tempfile::tempdir().unwrap();
        let scanner = ArchiveScanner::new(options(root.path())).register(Named("flat"));
        let found = scanner.discover(&HostPackage::File(root.path().join("missing.zip")));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "flat");
    }
}
