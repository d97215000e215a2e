//! Administrative UI plugin.
//!
//! Deploys the admin panel assets, caches the API catalog page during
//! initialization and serves it together with a user information endpoint.

pub mod model;
pub mod plugin;
mod routes;

pub use plugin::AdminUiPlugin;
