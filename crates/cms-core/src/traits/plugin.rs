//! Configuration lookup consumed by the plugin subsystem.

use std::fmt::Debug;

/// Read-only view of plugin configuration.
///
/// The plugin core only needs to know whether a plugin is switched on; the
/// free-form [`setting`](PluginSettings::setting) accessor lets individual
/// plugins read their own keys without the core knowing about them.
pub trait PluginSettings: Send + Sync + Debug {
    /// Returns `plugins.<plugin>.enabled`, defaulting to `false` when absent.
    fn enabled(&self, plugin: &str) -> bool;

    /// Returns `plugins.<plugin>.<key>` if present.
    fn setting(&self, _plugin: &str, _key: &str) -> Option<serde_json::Value> {
        None
    }
}
