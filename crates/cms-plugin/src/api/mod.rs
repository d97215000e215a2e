//! Plugin API: context exposed to plugin code during initialization.

pub mod context;

pub use context::{DeployPaths, InitContext};
