//! Per-candidate plugin record.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FailureReason, PluginError};
use crate::loader::LoadHandle;
use crate::traits::DeployBean;

/// How a plugin unit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Registered by the host at composition time.
    Flat,
    /// Sub-archive embedded in the host package.
    NestedArchive,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::NestedArchive => write!(f, "nested_archive"),
        }
    }
}

/// Lifecycle status of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Found and loaded, not yet checked against configuration.
    Discovered,
    /// Configuration switches it on.
    Enabled,
    /// Configuration leaves it off. Terminal.
    Disabled,
    /// `init()` succeeded. Terminal.
    Initialized,
    /// Loading, initialization or exposure failed. Terminal.
    Failed,
}

impl PluginStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disabled | Self::Initialized | Self::Failed)
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Initialized => write!(f, "initialized"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a plugin ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFailure {
    /// Failure class.
    pub reason: FailureReason,
    /// Human-readable detail.
    pub message: String,
}

impl From<&PluginError> for PluginFailure {
    fn from(err: &PluginError) -> Self {
        Self {
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

/// Identity, location, load handle and status of one discovered unit.
#[derive(Debug)]
pub struct PluginDescriptor {
    name: String,
    version: Option<String>,
    source: SourceKind,
    location: String,
    handle: Option<LoadHandle>,
    status: PluginStatus,
    failure: Option<PluginFailure>,
}

impl PluginDescriptor {
    /// A successfully loaded unit.
    pub fn discovered(
        name: impl Into<String>,
        version: Option<String>,
        source: SourceKind,
        location: impl Into<String>,
        handle: LoadHandle,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            source,
            location: location.into(),
            handle: Some(handle),
            status: PluginStatus::Discovered,
            failure: None,
        }
    }

    /// A unit that could not be loaded.
    pub fn failed(
        name: impl Into<String>,
        version: Option<String>,
        source: SourceKind,
        location: impl Into<String>,
        err: &PluginError,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            source,
            location: location.into(),
            handle: None,
            status: PluginStatus::Failed,
            failure: Some(err.into()),
        }
    }

    /// Unique plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin version, when known.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// How the unit was found.
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Module-path entry or nested archive path.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Current status.
    pub fn status(&self) -> PluginStatus {
        self.status
    }

    /// Failure detail, if `Failed`.
    pub fn failure(&self) -> Option<&PluginFailure> {
        self.failure.as_ref()
    }

    /// Load handle; `None` once released.
    pub fn handle(&self) -> Option<&LoadHandle> {
        self.handle.as_ref()
    }

    /// The loaded bean, while the handle is held.
    pub fn bean(&self) -> Option<&Arc<dyn DeployBean>> {
        self.handle.as_ref().map(LoadHandle::bean)
    }

    pub(crate) fn mark_enabled(&mut self) {
        self.status = PluginStatus::Enabled;
    }

    /// Disabled plugins keep no resources.
    pub(crate) fn mark_disabled(&mut self) {
        self.status = PluginStatus::Disabled;
        self.handle = None;
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.status = PluginStatus::Initialized;
    }

    /// Records the failure and releases the load handle.
    pub(crate) fn mark_failed(&mut self, err: &PluginError) {
        self.status = PluginStatus::Failed;
        self.failure = Some(err.into());
        self.handle = None;
    }

    /// Releases the load handle without changing the status.
    pub(crate) fn release(&mut self) -> Option<LoadHandle> {
        self.handle.take()
    }
}
