//! Boot outcome consumed by diagnostics surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{PluginDescriptor, PluginFailure, PluginStatus, SourceKind};
use crate::registry::PluginRegistry;

/// Final state of one discovered unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootEntry {
    /// Plugin name.
    pub name: String,
    /// Plugin version, when known.
    pub version: Option<String>,
    /// How the unit was found.
    pub source: SourceKind,
    /// Module-path entry or nested archive path.
    pub location: String,
    /// Final status.
    pub status: PluginStatus,
    /// Failure detail, if `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PluginFailure>,
}

impl From<&PluginDescriptor> for BootEntry {
    fn from(descriptor: &PluginDescriptor) -> Self {
        Self {
            name: descriptor.name().to_string(),
            version: descriptor.version().map(str::to_string),
            source: descriptor.source(),
            location: descriptor.location().to_string(),
            status: descriptor.status(),
            failure: descriptor.failure().cloned(),
        }
    }
}

/// Every discovered unit with its final status, in discovery order,
/// including units rejected as duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootReport {
    /// Entries in discovery order.
    pub entries: Vec<BootEntry>,
    /// When discovery started.
    pub started_at: DateTime<Utc>,
    /// When the report was taken.
    pub finished_at: DateTime<Utc>,
}

impl BootReport {
    /// Snapshots the registry.
    pub fn from_registry(registry: &PluginRegistry, started_at: DateTime<Utc>) -> Self {
        Self {
            entries: registry.all().map(BootEntry::from).collect(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Entry of an accepted plugin by name; the first entry wins for duplicates.
    pub fn get(&self, name: &str) -> Option<&BootEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Status of a plugin by name.
    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.get(name).map(|entry| entry.status)
    }

    /// Number of entries in a status.
    pub fn count(&self, status: PluginStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was discovered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
