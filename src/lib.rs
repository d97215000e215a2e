//! CMS host composition: plugin boot and the HTTP router built from it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use cms_core::config::{AppConfig, PluginsConfig};
use cms_plugin::error::PluginError;
use cms_plugin::handlers::{HandlerId, HandlerSet};
use cms_plugin::host::PluginHost;
use cms_plugin::loader::{ChainLoader, DynamicModuleLoader};
use cms_plugin::manager::LifecycleManager;
use cms_plugin::registry::PluginRegistry;
use cms_plugin::report::BootReport;
use cms_plugin::scanner::{ArchiveScanner, HostPackage, ScannerOptions};

use plugin_admin_ui::AdminUiPlugin;
use plugin_catalog::CatalogPlugin;

/// Route serving the boot report.
pub const PLUGINS_ROUTE: &str = "/api/plugins";

/// Scanner with every compiled-in plugin registered, in boot order.
pub fn plugin_scanner(config: &PluginsConfig) -> ArchiveScanner {
    ArchiveScanner::new(ScannerOptions::from_config(config))
        .with_loader(ChainLoader::new().then(DynamicModuleLoader::new()))
        .register(AdminUiPlugin::new())
        .register(CatalogPlugin::new())
}

/// Discovers, enables and initializes plugins, then builds the router.
pub async fn boot(config: &AppConfig) -> Result<(PluginHost, Router), PluginError> {
    boot_with(plugin_scanner(&config.plugins), config).await
}

/// Boots with a caller-supplied scanner.
pub async fn boot_with(
    scanner: ArchiveScanner,
    config: &AppConfig,
) -> Result<(PluginHost, Router), PluginError> {
    let package = HostPackage::from_config(&config.plugins);
    let registry = PluginRegistry::from_descriptors(scanner.discover(&package));
    tracing::info!(
        plugins = registry.len(),
        rejected = registry.rejected().len(),
        "Plugin discovery finished"
    );

    let mut handlers = HandlerSet::new();
    handlers.reserve("host", HandlerId::new(Method::GET, PLUGINS_ROUTE))?;

    let manager = LifecycleManager::from_config(registry, Arc::new(config.plugins.clone()));
    let (host, handlers) = manager.run(handlers).await?;

    let router = build_router(handlers, host.report());
    Ok((host, router))
}

/// Plugin routes plus the host's own routes.
pub fn build_router(handlers: HandlerSet, report: Arc<BootReport>) -> Router {
    let host_routes = Router::new()
        .route(PLUGINS_ROUTE, get(plugin_report))
        .with_state(report);

    handlers
        .into_router()
        .merge(host_routes)
        .layer(TraceLayer::new_for_http())
}

async fn plugin_report(State(report): State<Arc<BootReport>>) -> Json<BootReport> {
    Json(report.as_ref().clone())
}
