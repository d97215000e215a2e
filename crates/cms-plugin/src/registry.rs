//! Ordered collection of plugin descriptors.
//!
//! Insertion order is discovery order and drives every later phase. Names
//! are unique: when a second unit arrives under a name already present, the
//! first one stays and the newcomer is rejected as
//! [`FailureReason::DuplicatePluginName`](crate::error::FailureReason).

use std::collections::HashMap;

use tracing::warn;

use crate::descriptor::{PluginDescriptor, PluginStatus};
use crate::error::PluginError;

/// Name-unique, discovery-ordered descriptor table.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    /// Accepted descriptors in discovery order.
    descriptors: Vec<PluginDescriptor>,
    /// Name to position in `descriptors`.
    index: HashMap<String, usize>,
    /// Units rejected as duplicates, in arrival order.
    rejected: Vec<PluginDescriptor>,
    /// Every registration attempt, in arrival order.
    arrivals: Vec<Slot>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Accepted(usize),
    Rejected(usize),
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from discovered descriptors, in order.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = PluginDescriptor>) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            // Duplicates are recorded in `rejected`; the error only reports it.
            let _ = registry.register(descriptor);
        }
        registry
    }

    /// Adds a descriptor. A name already present keeps its first descriptor;
    /// the newcomer is marked failed, its handle released, and kept in
    /// [`rejected`](Self::rejected).
    pub fn register(&mut self, mut descriptor: PluginDescriptor) -> Result<(), PluginError> {
        if let Some(&position) = self.index.get(descriptor.name()) {
            let err = PluginError::DuplicatePluginName {
                name: descriptor.name().to_string(),
                location: descriptor.location().to_string(),
                existing: self.descriptors[position].location().to_string(),
            };
            warn!(
                plugin = %descriptor.name(),
                location = %descriptor.location(),
                error = %err,
                "Duplicate plugin name rejected"
            );
            descriptor.mark_failed(&err);
            self.arrivals.push(Slot::Rejected(self.rejected.len()));
            self.rejected.push(descriptor);
            return Err(err);
        }

        let position = self.descriptors.len();
        self.index.insert(descriptor.name().to_string(), position);
        self.arrivals.push(Slot::Accepted(position));
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Looks up an accepted descriptor by name.
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Accepted descriptors in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.iter()
    }

    /// Units rejected as duplicates.
    pub fn rejected(&self) -> &[PluginDescriptor] {
        &self.rejected
    }

    /// Accepted and rejected descriptors, interleaved in discovery order.
    pub fn all(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.arrivals.iter().map(|slot| match *slot {
            Slot::Accepted(i) => &self.descriptors[i],
            Slot::Rejected(i) => &self.rejected[i],
        })
    }

    /// Number of accepted descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no descriptor was accepted.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Accepted descriptors in a given status.
    pub fn with_status(&self, status: PluginStatus) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors
            .iter()
            .filter(move |descriptor| descriptor.status() == status)
    }

    pub(crate) fn descriptors_mut(&mut self) -> &mut [PluginDescriptor] {
        &mut self.descriptors
    }
}
