//! # cms-plugin
//!
//! Plugin subsystem of the CMS host. Provides:
//!
//! - Discovery of compiled-in beans and of plugin sub-archives nested in the host package
//! - Isolated loading: one staging area and, optionally, one dynamic library per plugin
//! - Per-plugin enablement from configuration
//! - Fault-isolated, ordered, time-boxed initialization
//! - Handler exposure to the host router with conflict detection
//! - Static asset deployment and cached resources for plugin authors

pub mod api;
pub mod deploy;
pub mod descriptor;
pub mod error;
pub mod ffi;
pub mod handlers;
pub mod host;
pub mod loader;
pub mod macros;
pub mod manager;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod resource;
pub mod scanner;
pub mod traits;

pub use api::context::{DeployPaths, InitContext};
pub use descriptor::{PluginDescriptor, PluginStatus, SourceKind};
pub use error::{FailureReason, PluginError};
pub use handlers::{HandlerContribution, HandlerId, HandlerSet};
pub use host::PluginHost;
pub use loader::{ChainLoader, DynamicModuleLoader, LoadHandle, ModuleLoader, StaticModuleLoader};
pub use manager::{BootPhase, LifecycleManager};
pub use registry::PluginRegistry;
pub use report::{BootEntry, BootReport};
pub use resource::CachedResource;
pub use scanner::{ArchiveScanner, HostPackage, ScannerOptions};
pub use traits::DeployBean;

#[doc(hidden)]
pub mod __private {
    pub use axum;
}
