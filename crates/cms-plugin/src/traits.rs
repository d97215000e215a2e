//! The capability every plugin module implements.

use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use cms_core::traits::PluginSettings;

use crate::api::context::InitContext;
use crate::handlers::HandlerContribution;

/// [`DeployBean::init_order`] of a bean that does not override it.
pub const DEFAULT_INIT_ORDER: i32 = 10_000;

/// An optional feature module with its own enablement flag and one-shot
/// initialization.
///
/// Beans are registered explicitly: either in the host's flat registration
/// table, through a [`StaticModuleLoader`](crate::loader::StaticModuleLoader)
/// factory, or exported from a dynamic library with
/// [`export_deploy_bean!`](crate::export_deploy_bean).
#[async_trait]
pub trait DeployBean: Send + Sync + Debug {
    /// Unique plugin name. Must equal the name the unit was discovered under.
    fn name(&self) -> &str;

    /// Plugin version, if the bean knows it.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Whether configuration switches this plugin on.
    ///
    /// Reads `plugins.<name>.enabled`; plugins are disabled unless configured.
    fn is_enabled(&self, settings: &dyn PluginSettings) -> bool {
        settings.enabled(self.name())
    }

    /// Position in the initialization sequence; lower values run first and
    /// equal values keep discovery order.
    fn init_order(&self) -> i32 {
        DEFAULT_INIT_ORDER
    }

    /// Directory holding `frontend/`, `server/` and `dump/` assets for the flat layout.
    fn assets_dir(&self) -> Option<PathBuf> {
        None
    }

    /// One-shot initialization, called once after the plugin's assets are deployed.
    async fn init(&self, ctx: &InitContext) -> anyhow::Result<()> {
        info!(
            plugin = %ctx.name(),
            "No tasks to run after basic configuration of plugin is completed"
        );
        Ok(())
    }

    /// Request handlers exposed to the host dispatcher once `init()` succeeded.
    fn contribute_handlers(&self) -> Vec<HandlerContribution> {
        Vec::new()
    }

    /// Called at process shutdown for plugins that reached `Initialized`.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
