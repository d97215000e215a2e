//! Contracts defined in `cms-core` and implemented by other crates.

pub mod plugin;

pub use plugin::PluginSettings;
