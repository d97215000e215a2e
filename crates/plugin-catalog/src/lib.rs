//! Catalog plugin.
//!
//! Loads the table of content layouts when the plugin is initialized and
//! serves it read-only.

pub mod layouts;
pub mod model;
pub mod plugin;
mod routes;

pub use plugin::CatalogPlugin;
