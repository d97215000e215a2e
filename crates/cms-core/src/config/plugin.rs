//! Plugin subsystem configuration.
//!
//! Besides the scanner and deployment knobs, every table nested under
//! `[plugins.<name>]` is captured as a [`PluginEntryConfig`]. The only key the
//! core interprets is `enabled`; everything else is handed to the plugin as a
//! free-form setting.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::traits::PluginSettings;

/// Plugin system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Host package holding nested plugin archives. `None` scans the flat layout only.
    #[serde(default)]
    pub host_package: Option<PathBuf>,
    /// Directory segment inside the host package where nested plugins live.
    #[serde(default = "default_library_segment")]
    pub library_segment: String,
    /// File extensions recognised as nested plugin archives.
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
    /// Root directory for per-plugin staging areas.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Upper bound for a single plugin `init()` call.
    #[serde(default = "default_init_timeout")]
    pub init_timeout_seconds: u64,
    /// Document root; server-side assets land in `<document_root>/resources`.
    #[serde(default = "default_document_root")]
    pub document_root: PathBuf,
    /// Directory receiving frontend assets.
    #[serde(default = "default_static_path")]
    pub static_path: PathBuf,
    /// Directory receiving data dumps shipped with plugins.
    #[serde(default = "default_dump_path")]
    pub dump_path: PathBuf,
    /// Overwrite assets that already exist on disk.
    #[serde(default)]
    pub rewrite: bool,
    /// Maximum number of entries a plugin archive may contain.
    #[serde(default = "default_threshold_entries")]
    pub threshold_entries: usize,
    /// Maximum total uncompressed size of deployed assets, in bytes.
    #[serde(default = "default_threshold_size")]
    pub threshold_size: u64,
    /// Maximum compression ratio tolerated for a single entry.
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: f64,
    /// Per-plugin tables keyed by plugin name.
    #[serde(flatten)]
    pub modules: HashMap<String, PluginEntryConfig>,
}

/// Configuration table for a single plugin (`[plugins.<name>]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginEntryConfig {
    /// Whether the plugin is enabled. Plugins are disabled unless configured.
    #[serde(default)]
    pub enabled: bool,
    /// Plugin-specific settings.
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            host_package: None,
            library_segment: default_library_segment(),
            archive_extensions: default_archive_extensions(),
            staging_dir: default_staging_dir(),
            init_timeout_seconds: default_init_timeout(),
            document_root: default_document_root(),
            static_path: default_static_path(),
            dump_path: default_dump_path(),
            rewrite: false,
            threshold_entries: default_threshold_entries(),
            threshold_size: default_threshold_size(),
            threshold_ratio: default_threshold_ratio(),
            modules: HashMap::new(),
        }
    }
}

impl PluginsConfig {
    /// Marks a plugin as enabled, creating its table if needed.
    pub fn enable(&mut self, name: &str) -> &mut PluginEntryConfig {
        let entry = self.modules.entry(name.to_string()).or_default();
        entry.enabled = true;
        entry
    }

    /// Stores a free-form setting for a plugin.
    pub fn set(&mut self, name: &str, key: &str, value: serde_json::Value) {
        self.modules
            .entry(name.to_string())
            .or_default()
            .settings
            .insert(key.to_string(), value);
    }
}

impl PluginSettings for PluginsConfig {
    fn enabled(&self, plugin: &str) -> bool {
        self.modules
            .get(plugin)
            .map(|entry| entry.enabled)
            .unwrap_or(false)
    }

    fn setting(&self, plugin: &str, key: &str) -> Option<serde_json::Value> {
        self.modules
            .get(plugin)
            .and_then(|entry| entry.settings.get(key).cloned())
    }
}

fn default_library_segment() -> String {
    "lib".to_string()
}

fn default_archive_extensions() -> Vec<String> {
    vec!["jar".to_string(), "zip".to_string()]
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/plugins")
}

fn default_init_timeout() -> u64 {
    30
}

fn default_document_root() -> PathBuf {
    PathBuf::from("./data/www")
}

fn default_static_path() -> PathBuf {
    PathBuf::from("./data/static")
}

fn default_dump_path() -> PathBuf {
    PathBuf::from("./data/dump")
}

fn default_threshold_entries() -> usize {
    10_000
}

fn default_threshold_size() -> u64 {
    1_000_000_000
}

fn default_threshold_ratio() -> f64 {
    10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_plugin_is_disabled() {
        let config = PluginsConfig::default();
        assert!(!config.enabled("admin-ui"));
        assert!(config.setting("admin-ui", "uri").is_none());
    }

    #[test]
    fn test_enable_and_settings() {
        let mut config = PluginsConfig::default();
        config.enable("catalog");
        config.set("catalog", "page_size", serde_json::json!(25));
        assert!(config.enabled("catalog"));
        assert!(!config.enabled("admin-ui"));
        assert_eq!(
            config.setting("catalog", "page_size"),
            Some(serde_json::json!(25))
        );
    }
}
