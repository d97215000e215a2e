//! Frozen post-boot plugin state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::descriptor::PluginStatus;
use crate::manager::panic_message;
use crate::registry::PluginRegistry;
use crate::report::BootReport;

/// The registry and boot report after the Exposure phase.
///
/// Nothing here changes until [`shutdown`](Self::shutdown), so request
/// handlers may read the report concurrently without locking.
#[derive(Debug)]
pub struct PluginHost {
    registry: PluginRegistry,
    report: Arc<BootReport>,
    shutdown_timeout: Duration,
    /// Registry indices in initialization order.
    sequence: Vec<usize>,
}

impl PluginHost {
    pub(crate) fn new(
        registry: PluginRegistry,
        report: BootReport,
        shutdown_timeout: Duration,
        sequence: Vec<usize>,
    ) -> Self {
        Self {
            registry,
            report: Arc::new(report),
            shutdown_timeout,
            sequence,
        }
    }

    /// The frozen registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Final boot report, shareable with request handlers.
    pub fn report(&self) -> Arc<BootReport> {
        Arc::clone(&self.report)
    }

    /// Calls `shutdown()` on initialized plugins in reverse initialization
    /// order, then releases every load handle.
    pub async fn shutdown(mut self) {
        let sequence = std::mem::take(&mut self.sequence);
        for index in sequence.into_iter().rev() {
            let Some(descriptor) = self.registry.descriptors_mut().get_mut(index) else {
                continue;
            };
            if descriptor.status() != PluginStatus::Initialized {
                continue;
            }
            let Some(bean) = descriptor.bean().cloned() else {
                continue;
            };

            let stopped = tokio::time::timeout(
                self.shutdown_timeout,
                AssertUnwindSafe(bean.shutdown()).catch_unwind(),
            )
            .await;
            drop(bean);

            match stopped {
                Ok(Ok(Ok(()))) => info!(plugin = %descriptor.name(), "Plugin stopped"),
                Ok(Ok(Err(e))) => warn!(plugin = %descriptor.name(), error = %e, "Plugin shutdown returned error"),
                Ok(Err(payload)) => error!(
                    plugin = %descriptor.name(),
                    panic = %panic_message(&*payload),
                    "Plugin shutdown panicked"
                ),
                Err(_) => warn!(
                    plugin = %descriptor.name(),
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Plugin shutdown timed out"
                ),
            }
            descriptor.release();
        }

        for descriptor in self.registry.descriptors_mut() {
            descriptor.release();
        }
        info!("All plugins stopped");
    }
}
