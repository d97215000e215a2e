//! Module loaders turning staged nested archives into plugin beans.
//!
//! Each nested unit is resolved in its own staging area and, when it ships a
//! dynamic library, in its own library handle. Nothing a unit loads is shared
//! with its siblings; symbol resolution stays local to the library.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::error::PluginError;
use crate::scanner::manifest::PluginManifest;
use crate::scanner::staging::StagedArchive;
use crate::traits::DeployBean;

/// A nested archive ready to be loaded.
#[derive(Debug)]
pub struct NestedUnit<'a> {
    /// Plugin name from the archive file name.
    pub name: &'a str,
    /// Version from the archive file name.
    pub version: &'a str,
    /// `<host package>!/<entry>` location used in logs and errors.
    pub location: &'a str,
    /// Parsed manifest.
    pub manifest: &'a PluginManifest,
    /// Private staging area holding the sub-archive.
    pub staged: &'a StagedArchive,
}

/// A dynamic library backing a loaded bean.
#[derive(Debug)]
pub struct ModuleLibrary {
    /// Library handle; unloaded on drop.
    #[cfg(feature = "dynamic")]
    library: libloading::Library,
    /// Extracted library file.
    path: PathBuf,
}

impl ModuleLibrary {
    /// Path of the extracted library file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Result of a successful load.
#[derive(Debug)]
pub struct LoadedModule {
    /// The bean instance.
    pub bean: Arc<dyn DeployBean>,
    /// Library the bean's code lives in, if any.
    pub library: Option<ModuleLibrary>,
}

impl LoadedModule {
    /// A bean whose code is linked into the host.
    pub fn linked(bean: Arc<dyn DeployBean>) -> Self {
        Self {
            bean,
            library: None,
        }
    }
}

/// Owns everything a discovered unit keeps alive: the bean, its library, and
/// its staging area.
///
/// Fields drop in declaration order, so the bean is released before the
/// library is unloaded and the library before the staging directory is
/// removed.
pub struct LoadHandle {
    /// The bean instance.
    bean: Arc<dyn DeployBean>,
    /// Library backing the bean's code.
    library: Option<ModuleLibrary>,
    /// Private staging directory.
    staged: Option<StagedArchive>,
}

impl LoadHandle {
    /// Handle for a bean from the host's own registration table.
    pub fn flat(bean: Arc<dyn DeployBean>) -> Self {
        Self {
            bean,
            library: None,
            staged: None,
        }
    }

    /// Handle for a bean loaded from a nested archive.
    pub fn nested(module: LoadedModule, staged: StagedArchive) -> Self {
        Self {
            bean: module.bean,
            library: module.library,
            staged: Some(staged),
        }
    }

    /// The bean instance.
    pub fn bean(&self) -> &Arc<dyn DeployBean> {
        &self.bean
    }

    /// Whether the unit was loaded in its own staging area.
    pub fn is_isolated(&self) -> bool {
        self.staged.is_some()
    }

    /// Staging directory of a nested unit.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staged.as_ref().map(StagedArchive::dir)
    }

    /// Staged copy of the nested sub-archive.
    pub fn archive_path(&self) -> Option<&Path> {
        self.staged.as_ref().map(StagedArchive::archive_path)
    }

    /// Dynamic library backing the bean, if any.
    pub fn library(&self) -> Option<&ModuleLibrary> {
        self.library.as_ref()
    }
}

impl Debug for LoadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadHandle")
            .field("bean", &self.bean.name())
            .field("library", &self.library.as_ref().map(ModuleLibrary::path))
            .field("staging_dir", &self.staging_dir())
            .finish()
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        // Unloading code that a live clone of the bean still points into is unsound.
        if self.library.is_some() && Arc::strong_count(&self.bean) > 1 {
            if let Some(library) = self.library.take() {
                warn!(
                    plugin = %self.bean.name(),
                    path = %library.path().display(),
                    "Plugin bean still referenced at release, keeping its library mapped"
                );
                std::mem::forget(library);
            }
        }
    }
}

/// Turns a staged nested unit into a bean.
pub trait ModuleLoader: Send + Sync + Debug {
    /// Loads the unit. `Ok(None)` means this loader does not handle it.
    fn load(&self, unit: &NestedUnit<'_>) -> Result<Option<LoadedModule>, PluginError>;
}

/// Factory producing a fresh bean instance.
pub type BeanFactory = Arc<dyn Fn() -> Arc<dyn DeployBean> + Send + Sync>;

/// Resolves nested units to beans compiled into the host, by plugin name.
#[derive(Clone, Default)]
pub struct StaticModuleLoader {
    /// Factories keyed by plugin name.
    factories: HashMap<String, BeanFactory>,
}

impl StaticModuleLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for the named plugin.
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn DeployBean> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Registers a factory for the named plugin, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn DeployBean> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Whether a factory is registered for the name.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("StaticModuleLoader")
            .field("factories", &names)
            .finish()
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, unit: &NestedUnit<'_>) -> Result<Option<LoadedModule>, PluginError> {
        Ok(self
            .factories
            .get(unit.name)
            .map(|factory| LoadedModule::linked(factory())))
    }
}

/// Tries several loaders in order; the first one that handles a unit wins.
#[derive(Debug, Default)]
pub struct ChainLoader {
    /// Loaders in priority order.
    loaders: Vec<Arc<dyn ModuleLoader>>,
}

impl ChainLoader {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a loader.
    pub fn then(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }
}

impl ModuleLoader for ChainLoader {
    fn load(&self, unit: &NestedUnit<'_>) -> Result<Option<LoadedModule>, PluginError> {
        for loader in &self.loaders {
            if let Some(module) = loader.load(unit)? {
                return Ok(Some(module));
            }
        }
        Ok(None)
    }
}

/// Dynamic library loader using `libloading` (feature-gated).
#[cfg(feature = "dynamic")]
pub mod dynamic_loader {
    use std::sync::Arc;

    use tracing::info;

    use super::{LoadedModule, ModuleLibrary, ModuleLoader, NestedUnit};
    use crate::error::PluginError;
    use crate::ffi::abi::{
        ABI_VERSION_SYMBOL, AbiVersionFn, BeanBox, CREATE_BEAN_SYMBOL, CreateBeanFn,
        PLUGIN_ABI_VERSION,
    };

    /// Loads the library named by a unit's manifest from its staging area.
    ///
    /// Units without a `library` entry are left to other loaders.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DynamicModuleLoader;

    impl DynamicModuleLoader {
        /// Creates a dynamic loader.
        pub fn new() -> Self {
            Self
        }
    }

    impl ModuleLoader for DynamicModuleLoader {
        fn load(&self, unit: &NestedUnit<'_>) -> Result<Option<LoadedModule>, PluginError> {
            let Some(entry) = unit.manifest.library.as_deref() else {
                return Ok(None);
            };

            let path = unit.staged.extract_entry(entry)?;
            let library = unsafe { libloading::Library::new(&path) }.map_err(|e| {
                PluginError::class_load(unit.location, format!("failed to open library: {e}"))
            })?;

            let version = unsafe {
                let symbol = library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL).map_err(|e| {
                    PluginError::class_load(unit.location, format!("missing ABI version: {e}"))
                })?;
                symbol()
            };
            if version != PLUGIN_ABI_VERSION {
                return Err(PluginError::class_load(
                    unit.location,
                    format!("ABI version {version} is not supported (expected {PLUGIN_ABI_VERSION})"),
                ));
            }

            let raw = unsafe {
                let symbol = library.get::<CreateBeanFn>(CREATE_BEAN_SYMBOL).map_err(|e| {
                    PluginError::class_load(unit.location, format!("missing bean factory: {e}"))
                })?;
                symbol()
            };
            if raw.is_null() {
                return Err(PluginError::class_load(
                    unit.location,
                    "bean factory returned null",
                ));
            }

            let bean: BeanBox = *unsafe { Box::from_raw(raw) };

            info!(
                plugin = %unit.name,
                path = %path.display(),
                "Plugin library loaded"
            );

            Ok(Some(LoadedModule {
                bean: Arc::from(bean),
                library: Some(ModuleLibrary { library, path }),
            }))
        }
    }
}

/// Stub loader when the dynamic feature is not enabled.
#[cfg(not(feature = "dynamic"))]
pub mod dynamic_loader {
    use super::{LoadedModule, ModuleLoader, NestedUnit};
    use crate::error::PluginError;

    /// Stub dynamic loader; rejects units that ship a library.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DynamicModuleLoader;

    impl DynamicModuleLoader {
        /// Creates a stub loader.
        pub fn new() -> Self {
            Self
        }
    }

    impl ModuleLoader for DynamicModuleLoader {
        fn load(&self, unit: &NestedUnit<'_>) -> Result<Option<LoadedModule>, PluginError> {
            match unit.manifest.library.as_deref() {
                Some(_) => Err(PluginError::class_load(
                    unit.location,
                    "dynamic plugin libraries are not supported by this build",
                )),
                None => Ok(None),
            }
        }
    }
}

pub use dynamic_loader::DynamicModuleLoader;

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use async_trait::async_trait;
    use zip::write::SimpleFileOptions;

    use super::*;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl DeployBean for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn staged(root: &Path) -> StagedArchive {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("META-INF/plugin.toml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"name = \"sample\"\nversion = \"1.0\"\n").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        StagedArchive::stage(root, "sample", "sample-1.0.jar", &bytes).unwrap()
    }

    fn manifest(library: Option<&str>) -> PluginManifest {
        PluginManifest {
            name: "sample".into(),
            version: "1.0".into(),
            library: library.map(str::to_string),
            description: None,
        }
    }

    #[test]
    fn test_static_loader_resolves_by_name() {
        let root = tempfile::tempdir().unwrap();
        let staged = staged(root.path());
        let manifest = manifest(None);
        let unit = NestedUnit {
            name: "sample",
            version: "1.0",
            location: "host.zip!/lib/sample-1.0.jar",
            manifest: &manifest,
            staged: &staged,
        };

        let loader = StaticModuleLoader::new().with("sample", || Arc::new(Named("sample")));
        let module = loader.load(&unit).unwrap().unwrap();
        assert_eq!(module.bean.name(), "sample");
        assert!(module.library.is_none());

        let other = StaticModuleLoader::new();
        assert!(other.load(&unit).unwrap().is_none());
    }

    #[test]
    fn test_chain_falls_through() {
        let root = tempfile::tempdir().unwrap();
        let staged = staged(root.path());
        let manifest = manifest(None);
        let unit = NestedUnit {
            name: "sample",
            version: "1.0",
            location: "host.zip!/lib/sample-1.0.jar",
            manifest: &manifest,
            staged: &staged,
        };

        let chain = ChainLoader::new()
            .then(DynamicModuleLoader::new())
            .then(StaticModuleLoader::new().with("sample", || Arc::new(Named("sample"))));
        assert!(chain.load(&unit).unwrap().is_some());
    }

    #[test]
    fn test_handle_owns_staging_area() {
        let root = tempfile::tempdir().unwrap();
        let staged = staged(root.path());
        let dir = staged.dir().to_path_buf();

        let handle = LoadHandle::nested(LoadedModule::linked(Arc::new(Named("sample"))), staged);
        assert!(handle.is_isolated());
        assert_eq!(handle.staging_dir(), Some(dir.as_path()));

        drop(handle);
        assert!(!dir.exists());
    }
}
