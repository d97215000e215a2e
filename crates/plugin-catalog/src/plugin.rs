//! Catalog plugin bean.

use std::sync::Arc;

use cms_plugin::prelude::*;
use tracing::info;

use crate::layouts::LayoutTable;
use crate::routes;

/// Plugin name; configuration lives under `[plugins.catalog]`.
pub const PLUGIN_NAME: &str = "catalog";

#[derive(Debug)]
pub(crate) struct CatalogState {
    pub(crate) layouts: CachedResource<LayoutTable>,
}

/// Serves catalog layouts.
#[derive(Debug, Clone)]
pub struct CatalogPlugin {
    state: Arc<CatalogState>,
}

impl CatalogPlugin {
    pub fn new() -> Self {
        Self {
            state: Arc::new(CatalogState {
                layouts: CachedResource::new("layouts"),
            }),
        }
    }
}

impl Default for CatalogPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeployBean for CatalogPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }

    async fn init(&self, ctx: &InitContext) -> anyhow::Result<()> {
        let table = self
            .state
            .layouts
            .load_with(|| LayoutTable::from_setting(ctx.setting("layouts")))?;

        info!(plugin = PLUGIN_NAME, layouts = table.len(), "Catalog layouts loaded");
        Ok(())
    }

    fn contribute_handlers(&self) -> Vec<HandlerContribution> {
        contributions![
            state = Arc::clone(&self.state);
            get "/catalog/layouts" => routes::list_layouts,
            get "/catalog/layouts/{name}" => routes::get_layout,
        ]
    }
}
