//! Error taxonomy for the plugin subsystem.
//!
//! Boot-time failures (`ArchiveNotFound`, `ClassLoad`, `PluginInit`,
//! `DuplicatePluginName`, `HandlerConflict`) are contained at the scanner and
//! lifecycle boundaries: they degrade a single descriptor to `Failed` and are
//! recorded as a [`FailureReason`]. `ResourceNotLoaded` is a request-time
//! failure returned by a plugin's own operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cms_core::error::AppError;

use crate::manager::BootPhase;

/// Errors raised by the plugin subsystem.
#[derive(Debug, Error)]
pub enum PluginError {
    /// An expected nested entry is missing or could not be read.
    #[error("Archive entry not found in {location}: {entry}")]
    ArchiveNotFound {
        /// Host package or sub-archive being read.
        location: String,
        /// Entry that was expected.
        entry: String,
    },

    /// Module bytes are corrupt, incompatible, or could not be turned into a bean.
    #[error("Failed to load plugin module from {location}: {message}")]
    ClassLoad {
        /// Location of the unit being loaded.
        location: String,
        /// Failure description.
        message: String,
    },

    /// `init()` returned an error, panicked, timed out, or was cancelled.
    #[error("Plugin '{name}' failed to initialize: {message}")]
    PluginInit {
        /// Plugin name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Two discovered units share the same plugin name.
    #[error("Plugin '{name}' from {location} duplicates the one already discovered at {existing}")]
    DuplicatePluginName {
        /// Shared plugin name.
        name: String,
        /// Location of the rejected unit.
        location: String,
        /// Location of the unit that was kept.
        existing: String,
    },

    /// A cached resource was requested before it was successfully loaded.
    #[error("Resource '{resource}' has not been loaded")]
    ResourceNotLoaded {
        /// Resource identifier.
        resource: String,
    },

    /// Two plugins contributed the same handler identity.
    #[error("Handler {handler} contributed by '{plugin}' is already provided by '{owner}'")]
    HandlerConflict {
        /// Conflicting handler identity.
        handler: String,
        /// Plugin whose contribution was rejected.
        plugin: String,
        /// Current owner of the identity.
        owner: String,
    },

    /// A contributed handler path cannot be mounted.
    #[error("Handler path '{path}' contributed by '{plugin}' is invalid: {message}")]
    InvalidHandler {
        /// Offending path.
        path: String,
        /// Contributing plugin.
        plugin: String,
        /// Why the path is rejected.
        message: String,
    },

    /// The router refused a contributed handler.
    #[error("Handler {handler} contributed by '{plugin}' cannot be routed: {message}")]
    RouteRejected {
        /// Method and path of the handler.
        handler: String,
        /// Contributing plugin.
        plugin: String,
        /// Router diagnostic.
        message: String,
    },

    /// A lifecycle phase was requested out of order.
    #[error("Boot phase {requested} cannot run while the manager is in phase {current}")]
    PhaseOrder {
        /// Phase that was requested.
        requested: BootPhase,
        /// Phase the manager is in.
        current: BootPhase,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP library error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Failure classification recorded on a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Expected nested entry missing or unreadable.
    ArchiveNotFound,
    /// Corrupt or incompatible module.
    ClassLoad,
    /// Initialization failed or timed out.
    PluginInit,
    /// Rejected because another unit already uses the name.
    DuplicatePluginName,
    /// Handler contribution could not be merged.
    HandlerConflict,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchiveNotFound => write!(f, "archive_not_found"),
            Self::ClassLoad => write!(f, "class_load"),
            Self::PluginInit => write!(f, "plugin_init"),
            Self::DuplicatePluginName => write!(f, "duplicate_plugin_name"),
            Self::HandlerConflict => write!(f, "handler_conflict"),
        }
    }
}

impl PluginError {
    /// Classification recorded when this error degrades a descriptor.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::ArchiveNotFound { .. } | Self::Io(_) => FailureReason::ArchiveNotFound,
            Self::ClassLoad { .. } | Self::Zip(_) => FailureReason::ClassLoad,
            Self::DuplicatePluginName { .. } => FailureReason::DuplicatePluginName,
            Self::HandlerConflict { .. }
            | Self::InvalidHandler { .. }
            | Self::RouteRejected { .. } => FailureReason::HandlerConflict,
            Self::PluginInit { .. } | Self::ResourceNotLoaded { .. } | Self::PhaseOrder { .. } => {
                FailureReason::PluginInit
            }
        }
    }

    /// Shorthand for a [`PluginError::ClassLoad`].
    pub fn class_load(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClassLoad {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`PluginError::ResourceNotLoaded`].
    pub fn resource_not_loaded(resource: impl Into<String>) -> Self {
        Self::ResourceNotLoaded {
            resource: resource.into(),
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        match &err {
            PluginError::ResourceNotLoaded { .. } => AppError::service_unavailable(err.to_string()),
            PluginError::DuplicatePluginName { .. }
            | PluginError::HandlerConflict { .. }
            | PluginError::RouteRejected { .. } => AppError::conflict(err.to_string()),
            _ => AppError::plugin(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_core::error::ErrorKind;

    #[test]
    fn test_reason_classification() {
        let err = PluginError::class_load("lib/x-1.0.jar", "bad bytes");
        assert_eq!(err.reason(), FailureReason::ClassLoad);

        let err = PluginError::ArchiveNotFound {
            location: "lib/x-1.0.jar".into(),
            entry: "META-INF/plugin.toml".into(),
        };
        assert_eq!(err.reason(), FailureReason::ArchiveNotFound);
        assert_eq!(err.reason().to_string(), "archive_not_found");
    }

    #[test]
    fn test_resource_not_loaded_maps_to_unavailable() {
        let app: AppError = PluginError::resource_not_loaded("apicatalog.html").into();
        assert_eq!(app.kind, ErrorKind::ServiceUnavailable);
        assert!(app.message.contains("apicatalog.html"));
    }
}
