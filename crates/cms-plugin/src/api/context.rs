//! Context handed to a plugin's `init()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cms_core::config::PluginsConfig;
use cms_core::traits::PluginSettings;

/// Directories receiving deployed plugin assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPaths {
    /// Document root; server assets land in `<document_root>/resources`.
    pub document_root: PathBuf,
    /// Target for frontend assets.
    pub static_path: PathBuf,
    /// Target for data dumps.
    pub dump_path: PathBuf,
}

impl DeployPaths {
    /// Builds the paths from the plugin configuration section.
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self {
            document_root: config.document_root.clone(),
            static_path: config.static_path.clone(),
            dump_path: config.dump_path.clone(),
        }
    }

    /// Roots all three targets under one directory, mostly for tests and development.
    pub fn under(root: &Path) -> Self {
        Self {
            document_root: root.join("www"),
            static_path: root.join("static"),
            dump_path: root.join("dump"),
        }
    }

    /// Directory holding server-side resources.
    pub fn resources_dir(&self) -> PathBuf {
        self.document_root.join("resources")
    }
}

/// Services and paths available to a plugin during initialization.
#[derive(Clone)]
pub struct InitContext {
    /// Plugin being initialized.
    name: String,
    /// Configuration lookup.
    settings: Arc<dyn PluginSettings>,
    /// Asset directories.
    paths: DeployPaths,
}

impl std::fmt::Debug for InitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitContext")
            .field("name", &self.name)
            .field("paths", &self.paths)
            .finish()
    }
}

impl InitContext {
    /// Creates a context for the named plugin.
    pub fn new(name: impl Into<String>, settings: Arc<dyn PluginSettings>, paths: DeployPaths) -> Self {
        Self {
            name: name.into(),
            settings,
            paths,
        }
    }

    /// Name of the plugin being initialized.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full configuration lookup.
    pub fn settings(&self) -> &Arc<dyn PluginSettings> {
        &self.settings
    }

    /// Reads `plugins.<name>.<key>` for the plugin being initialized.
    pub fn setting(&self, key: &str) -> Option<serde_json::Value> {
        self.settings.setting(&self.name, key)
    }

    /// Reads a string setting, falling back to `default`.
    pub fn setting_str(&self, key: &str, default: &str) -> String {
        self.setting(key)
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    /// Asset directories.
    pub fn paths(&self) -> &DeployPaths {
        &self.paths
    }

    /// Directory holding server-side resources deployed by plugins.
    pub fn resources_dir(&self) -> PathBuf {
        self.paths.resources_dir()
    }
}
