//! Admin UI plugin bean.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use cms_plugin::api::context::InitContext;
use cms_plugin::contributions;
use cms_plugin::error::PluginError;
use cms_plugin::handlers::HandlerContribution;
use cms_plugin::resource::CachedResource;
use cms_plugin::traits::DeployBean;

use crate::routes;

/// Plugin name; configuration lives under `[plugins.admin-ui]`.
pub const PLUGIN_NAME: &str = "admin-ui";

/// Page served at `/apicatalog` unless `page` is configured.
pub const DEFAULT_PAGE: &str = "apicatalog.html";

/// State shared with the request handlers.
#[derive(Debug)]
pub(crate) struct AdminUiState {
    pub(crate) page: CachedResource<Bytes>,
}

/// Administrative UI plugin.
#[derive(Debug, Clone)]
pub struct AdminUiPlugin {
    state: Arc<AdminUiState>,
}

impl AdminUiPlugin {
    /// Creates the plugin with nothing loaded.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AdminUiState {
                page: CachedResource::new(DEFAULT_PAGE),
            }),
        }
    }

    /// The API catalog page cached during `init()`.
    pub fn api_catalog_page(&self) -> Result<Bytes, PluginError> {
        self.state.page.get().cloned()
    }
}

impl Default for AdminUiPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeployBean for AdminUiPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }

    fn assets_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets"))
    }

    async fn init(&self, ctx: &InitContext) -> anyhow::Result<()> {
        let page = ctx.resources_dir().join(ctx.setting_str("page", DEFAULT_PAGE));
        let content = tokio::fs::read(&page)
            .await
            .with_context(|| format!("API catalog page {} is not readable", page.display()))?;

        let size = content.len();
        self.state.page.load(Bytes::from(content));

        info!(
            plugin = PLUGIN_NAME,
            page = %page.display(),
            bytes = size,
            "API catalog page loaded"
        );
        Ok(())
    }

    fn contribute_handlers(&self) -> Vec<HandlerContribution> {
        contributions![
            state = Arc::clone(&self.state);
            get "/apicatalog" => routes::api_catalog,
            get "/apicatalog/{*path}" => routes::api_catalog,
            get "/admin-ui/userinfo" => routes::user_info,
        ]
    }
}
