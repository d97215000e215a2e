//! Boot lifecycle: Discovery → Enablement → Initialization → Exposure.
//!
//! Every phase walks the registry in discovery order, one plugin at a time.
//! A plugin that fails, panics or times out is marked `Failed` and the walk
//! goes on; no single plugin can abort host boot.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cms_core::config::PluginsConfig;
use cms_core::traits::PluginSettings;

use crate::api::context::{DeployPaths, InitContext};
use crate::deploy::AssetDeployer;
use crate::descriptor::PluginStatus;
use crate::error::PluginError;
use crate::handlers::HandlerSet;
use crate::host::PluginHost;
use crate::registry::PluginRegistry;
use crate::report::BootReport;
use crate::traits::DeployBean;

/// Default upper bound for one `init()` call.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Last completed boot phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootPhase {
    /// Registry populated by the scanner.
    Discovered,
    /// Configuration consulted.
    Enabled,
    /// `init()` run for every enabled plugin.
    Initialized,
    /// Handlers handed to the dispatcher.
    Exposed,
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Enabled => write!(f, "enabled"),
            Self::Initialized => write!(f, "initialized"),
            Self::Exposed => write!(f, "exposed"),
        }
    }
}

/// Where a plugin's assets come from.
enum AssetSource {
    Archive(PathBuf),
    Directory(PathBuf),
}

/// Drives the boot phases over a [`PluginRegistry`].
pub struct LifecycleManager {
    registry: PluginRegistry,
    settings: Arc<dyn PluginSettings>,
    deployer: Option<AssetDeployer>,
    paths: DeployPaths,
    init_timeout: Duration,
    cancel: CancellationToken,
    phase: BootPhase,
    /// Registry indices of enabled plugins, in initialization order.
    sequence: Vec<usize>,
    started_at: DateTime<Utc>,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("plugins", &self.registry.len())
            .field("phase", &self.phase)
            .field("init_timeout", &self.init_timeout)
            .field("deploys_assets", &self.deployer.is_some())
            .finish()
    }
}

impl LifecycleManager {
    /// Creates a manager over a discovered registry. Assets are not deployed
    /// unless a deployer is configured.
    pub fn new(registry: PluginRegistry, settings: Arc<dyn PluginSettings>) -> Self {
        Self {
            registry,
            settings,
            deployer: None,
            paths: DeployPaths::from_config(&PluginsConfig::default()),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            cancel: CancellationToken::new(),
            phase: BootPhase::Discovered,
            sequence: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Creates a manager using the plugin configuration section for
    /// settings, timeout and asset deployment.
    pub fn from_config(registry: PluginRegistry, config: Arc<PluginsConfig>) -> Self {
        let deployer = AssetDeployer::from_config(&config);
        let timeout = match config.init_timeout_seconds {
            0 => {
                warn!(
                    default = ?DEFAULT_INIT_TIMEOUT,
                    "plugins.init_timeout_seconds is 0, using the default"
                );
                DEFAULT_INIT_TIMEOUT
            }
            seconds => Duration::from_secs(seconds),
        };
        Self::new(registry, config)
            .with_deployer(deployer)
            .with_init_timeout(timeout)
    }

    /// Sets the upper bound for one `init()` call.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Deploys plugin assets before `init()` using `deployer`.
    pub fn with_deployer(mut self, deployer: AssetDeployer) -> Self {
        self.paths = deployer.paths().clone();
        self.deployer = Some(deployer);
        self
    }

    /// Interrupts initialization when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Last completed phase.
    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    /// The registry being driven.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Snapshot of every plugin's current status.
    pub fn report(&self) -> BootReport {
        BootReport::from_registry(&self.registry, self.started_at)
    }

    /// Consults configuration for every discovered plugin.
    pub fn enable(&mut self) -> Result<(), PluginError> {
        self.advance(BootPhase::Discovered, BootPhase::Enabled)?;

        let settings = Arc::clone(&self.settings);
        let mut orders = Vec::new();
        for (index, descriptor) in self.registry.descriptors_mut().iter_mut().enumerate() {
            if descriptor.status() != PluginStatus::Discovered {
                continue;
            }
            let Some(bean) = descriptor.bean().cloned() else {
                continue;
            };

            // The payload may carry code from the plugin's library; drop it
            // before the descriptor can release that library.
            let enabled = panic::catch_unwind(AssertUnwindSafe(|| {
                bean.is_enabled(settings.as_ref()).then(|| bean.init_order())
            }))
            .map_err(|payload| panic_message(&*payload));
            drop(bean);

            match enabled {
                Ok(Some(order)) => {
                    info!(plugin = %descriptor.name(), init_order = order, "Plugin is enabled");
                    descriptor.mark_enabled();
                    orders.push((index, order));
                }
                Ok(None) => {
                    info!(plugin = %descriptor.name(), "Plugin is disabled by configuration");
                    descriptor.mark_disabled();
                }
                Err(message) => {
                    let err = PluginError::PluginInit {
                        name: descriptor.name().to_string(),
                        message: format!("enablement check panicked: {message}"),
                    };
                    error!(plugin = %descriptor.name(), error = %err, "Plugin enablement failed");
                    descriptor.mark_failed(&err);
                }
            }
        }

        // Stable: equal orders keep discovery order.
        orders.sort_by_key(|&(_, order)| order);
        self.sequence = orders.into_iter().map(|(index, _)| index).collect();
        self.phase = BootPhase::Enabled;
        Ok(())
    }

    /// Deploys assets and runs `init()` for every enabled plugin, by
    /// ascending [`init_order`](DeployBean::init_order) then discovery order,
    /// and reports the outcome.
    pub async fn initialize_all(&mut self) -> Result<BootReport, PluginError> {
        self.advance(BootPhase::Enabled, BootPhase::Initialized)?;

        for index in self.sequence.clone() {
            let Some(descriptor) = self.registry.iter().nth(index) else {
                break;
            };
            if descriptor.status() != PluginStatus::Enabled {
                continue;
            }
            let Some(handle) = descriptor.handle() else {
                continue;
            };
            let name = descriptor.name().to_string();
            let bean = Arc::clone(handle.bean());
            let source = handle
                .archive_path()
                .map(|path| AssetSource::Archive(path.to_path_buf()))
                .or_else(|| bean.assets_dir().map(AssetSource::Directory));

            if let Some(source) = source {
                self.deploy_assets(&name, source).await;
            }

            let started = Instant::now();
            let ctx = InitContext::new(&name, Arc::clone(&self.settings), self.paths.clone());
            let outcome = self.run_init(&name, &bean, &ctx).await;
            drop(bean);

            let descriptor = &mut self.registry.descriptors_mut()[index];
            match outcome {
                Ok(()) => {
                    info!(
                        plugin = %name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Plugin initialized"
                    );
                    descriptor.mark_initialized();
                }
                Err(err) => {
                    error!(plugin = %name, error = %err, "Plugin initialization failed");
                    descriptor.mark_failed(&err);
                }
            }
        }

        self.phase = BootPhase::Initialized;
        let report = self.report();
        info!(
            total = report.len(),
            initialized = report.count(PluginStatus::Initialized),
            disabled = report.count(PluginStatus::Disabled),
            failed = report.count(PluginStatus::Failed),
            "Plugin initialization finished"
        );
        Ok(report)
    }

    /// Merges the handlers of every initialized plugin into `handlers`.
    ///
    /// A plugin whose contribution conflicts with handlers already present is
    /// marked failed and none of its handlers are merged.
    pub fn expose(&mut self, mut handlers: HandlerSet) -> Result<HandlerSet, PluginError> {
        self.advance(BootPhase::Initialized, BootPhase::Exposed)?;

        for descriptor in self.registry.descriptors_mut() {
            if descriptor.status() != PluginStatus::Initialized {
                continue;
            }
            let Some(bean) = descriptor.bean().cloned() else {
                continue;
            };

            let contributed = panic::catch_unwind(AssertUnwindSafe(|| bean.contribute_handlers()))
                .map_err(|payload| panic_message(&*payload));
            drop(bean);

            let merged = match contributed {
                Ok(contributions) => handlers.merge(descriptor.name(), contributions),
                Err(message) => Err(PluginError::PluginInit {
                    name: descriptor.name().to_string(),
                    message: format!("handler contribution panicked: {message}"),
                }),
            };

            match merged {
                Ok(0) => debug!(plugin = %descriptor.name(), "Plugin contributes no handlers"),
                Ok(count) => info!(plugin = %descriptor.name(), handlers = count, "Plugin handlers exposed"),
                Err(err) => {
                    error!(plugin = %descriptor.name(), error = %err, "Plugin handlers rejected");
                    descriptor.mark_failed(&err);
                }
            }
        }

        self.phase = BootPhase::Exposed;
        Ok(handlers)
    }

    /// Finishes boot, freezing the registry.
    pub fn into_host(self) -> Result<PluginHost, PluginError> {
        if self.phase != BootPhase::Exposed {
            return Err(PluginError::PhaseOrder {
                requested: BootPhase::Exposed,
                current: self.phase,
            });
        }
        let report = self.report();
        Ok(PluginHost::new(self.registry, report, self.init_timeout, self.sequence))
    }

    /// Runs every remaining phase and returns the frozen host together with
    /// the merged handler set.
    pub async fn run(mut self, handlers: HandlerSet) -> Result<(PluginHost, HandlerSet), PluginError> {
        self.enable()?;
        self.initialize_all().await?;
        let handlers = self.expose(handlers)?;
        Ok((self.into_host()?, handlers))
    }

    fn advance(&self, required: BootPhase, requested: BootPhase) -> Result<(), PluginError> {
        if self.phase != required {
            return Err(PluginError::PhaseOrder {
                requested,
                current: self.phase,
            });
        }
        Ok(())
    }

    /// Deployment problems are logged and never fail the plugin.
    async fn deploy_assets(&self, name: &str, source: AssetSource) {
        let Some(deployer) = self.deployer.clone() else {
            return;
        };

        let deployed = tokio::task::spawn_blocking(move || match source {
            AssetSource::Archive(path) => deployer.deploy_archive(&path),
            AssetSource::Directory(path) => deployer.deploy_directory(&path),
        })
        .await;

        match deployed {
            Ok(Ok(stats)) => debug!(
                plugin = %name,
                copied = stats.copied,
                skipped = stats.skipped,
                "Plugin assets ready"
            ),
            Ok(Err(e)) => warn!(plugin = %name, error = %e, "Plugin asset deployment failed"),
            Err(e) => warn!(plugin = %name, error = %e, "Plugin asset deployment task failed"),
        }
    }

    async fn run_init(
        &self,
        name: &str,
        bean: &Arc<dyn DeployBean>,
        ctx: &InitContext,
    ) -> Result<(), PluginError> {
        let fail = |message: String| PluginError::PluginInit {
            name: name.to_string(),
            message,
        };

        if self.cancel.is_cancelled() {
            return Err(fail("boot was cancelled before init".to_string()));
        }

        let guarded = AssertUnwindSafe(bean.init(ctx)).catch_unwind();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(fail("boot was cancelled during init".to_string())),
            result = tokio::time::timeout(self.init_timeout, guarded) => match result {
                Err(_) => Err(fail(format!("init timed out after {:?}", self.init_timeout))),
                Ok(Err(payload)) => Err(fail(format!("init panicked: {}", panic_message(&*payload)))),
                Ok(Ok(Err(e))) => Err(fail(format!("{e:#}"))),
                Ok(Ok(Ok(()))) => Ok(()),
            },
        }
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::descriptor::{PluginDescriptor, SourceKind};
    use crate::loader::LoadHandle;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl DeployBean for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn manager(names: &[&'static str], config: PluginsConfig) -> LifecycleManager {
        let registry = PluginRegistry::from_descriptors(names.iter().map(|name| {
            PluginDescriptor::discovered(
                *name,
                None,
                SourceKind::Flat,
                *name,
                LoadHandle::flat(Arc::new(Named(name))),
            )
        }));
        LifecycleManager::new(registry, Arc::new(config))
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
    }

    #[tokio::test]
    async fn test_phase_order_enforced() {
        let mut manager = manager(&["a"], PluginsConfig::default());

        let err = manager.initialize_all().await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::PhaseOrder {
                requested: BootPhase::Initialized,
                current: BootPhase::Discovered
            }
        ));

        manager.enable().unwrap();
        assert!(manager.enable().is_err());
        assert_eq!(manager.phase(), BootPhase::Enabled);
    }

    #[tokio::test]
    async fn test_into_host_requires_exposure() {
        let mut manager = manager(&["a"], PluginsConfig::default());
        manager.enable().unwrap();
        manager.initialize_all().await.unwrap();
        assert!(manager.into_host().is_err());
    }

    #[tokio::test]
    async fn test_disabled_plugins_release_their_handle() {
        let mut config = PluginsConfig::default();
        config.enable("on");
        let mut manager = manager(&["on", "off"], config);
        manager.enable().unwrap();

        let off = manager.registry().get("off").unwrap();
        assert_eq!(off.status(), PluginStatus::Disabled);
        assert!(off.handle().is_none());
        assert_eq!(
            manager.registry().get("on").unwrap().status(),
            PluginStatus::Enabled
        );
    }

    #[test]
    fn test_zero_init_timeout_falls_back_to_default() {
        let mut config = PluginsConfig::default();
        config.init_timeout_seconds = 0;
        let manager = LifecycleManager::from_config(PluginRegistry::default(), Arc::new(config));
        assert_eq!(manager.init_timeout, DEFAULT_INIT_TIMEOUT);

        let mut config = PluginsConfig::default();
        config.init_timeout_seconds = 5;
        let manager = LifecycleManager::from_config(PluginRegistry::default(), Arc::new(config));
        assert_eq!(manager.init_timeout, Duration::from_secs(5));
    }

    /// Panic payload noting whether it outlived the bean that raised it.
    struct Payload {
        released: Arc<AtomicBool>,
        outlived: Arc<AtomicBool>,
    }

    impl Drop for Payload {
        fn drop(&mut self) {
            if self.released.load(Ordering::SeqCst) {
                self.outlived.store(true, Ordering::SeqCst);
            }
        }
    }

    #[derive(Debug)]
    struct Raising {
        name: &'static str,
        in_contribution: bool,
        released: Arc<AtomicBool>,
        outlived: Arc<AtomicBool>,
    }

    impl Raising {
        fn raise(&self) -> ! {
            panic::panic_any(Payload {
                released: Arc::clone(&self.released),
                outlived: Arc::clone(&self.outlived),
            })
        }
    }

    impl Drop for Raising {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DeployBean for Raising {
        fn name(&self) -> &str {
            self.name
        }

        fn is_enabled(&self, _settings: &dyn PluginSettings) -> bool {
            if self.in_contribution {
                true
            } else {
                self.raise()
            }
        }

        fn contribute_handlers(&self) -> Vec<crate::handlers::HandlerContribution> {
            self.raise()
        }
    }

    fn raising_manager(in_contribution: bool) -> (LifecycleManager, Arc<AtomicBool>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let outlived = Arc::new(AtomicBool::new(false));
        let bean = Raising {
            name: "raising",
            in_contribution,
            released: Arc::clone(&released),
            outlived: Arc::clone(&outlived),
        };
        let registry = PluginRegistry::from_descriptors([PluginDescriptor::discovered(
            "raising",
            None,
            SourceKind::Flat,
            "raising",
            LoadHandle::flat(Arc::new(bean)),
        )]);
        let manager = LifecycleManager::new(registry, Arc::new(PluginsConfig::default()));
        (manager, released, outlived)
    }

    #[test]
    fn test_enablement_panic_payload_dropped_before_release() {
        let (mut manager, released, outlived) = raising_manager(false);
        manager.enable().unwrap();

        let descriptor = manager.registry().get("raising").unwrap();
        assert_eq!(descriptor.status(), PluginStatus::Failed);
        assert!(released.load(Ordering::SeqCst));
        assert!(!outlived.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_contribution_panic_payload_dropped_before_release() {
        let (mut manager, released, outlived) = raising_manager(true);
        manager.enable().unwrap();
        manager.initialize_all().await.unwrap();
        let handlers = manager.expose(HandlerSet::new()).unwrap();

        assert!(handlers.is_empty());
        let descriptor = manager.registry().get("raising").unwrap();
        assert_eq!(descriptor.status(), PluginStatus::Failed);
        assert!(released.load(Ordering::SeqCst));
        assert!(!outlived.load(Ordering::SeqCst));
    }
}
