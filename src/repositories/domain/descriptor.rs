//! Replicated repository descriptors and the snapshots that carry them.

use super::{NamePattern, RepositoryName, RepositorySettings, RepositoryType};
use serde::{Deserialize, Serialize};

/// Declarative configuration naming a repository and its backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    name: RepositoryName,
    #[serde(rename = "type")]
    repository_type: RepositoryType,
    settings: RepositorySettings,
}

impl RepositoryDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub const fn new(
        name: RepositoryName,
        repository_type: RepositoryType,
        settings: RepositorySettings,
    ) -> Self {
        Self {
            name,
            repository_type,
            settings,
        }
    }

    /// Returns the repository name.
    #[must_use]
    pub const fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// Returns the backend type.
    #[must_use]
    pub const fn repository_type(&self) -> &RepositoryType {
        &self.repository_type
    }

    /// Returns the backend settings.
    #[must_use]
    pub const fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    /// Returns `true` when `other` binds the same type and settings.
    ///
    /// The name is not compared; callers match descriptors by name first.
    #[must_use]
    pub fn same_binding(&self, other: &Self) -> bool {
        self.repository_type == other.repository_type && self.settings == other.settings
    }
}

/// Outcome of inserting a descriptor into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorChange {
    /// No descriptor with this name existed; it was appended.
    Added,
    /// A different descriptor with this name was replaced in place.
    Updated,
    /// An identical descriptor already existed.
    Unchanged,
}

/// Immutable ordered list of descriptors for one metadata version.
///
/// At most one descriptor exists per name. Mutating helpers return a new
/// snapshot and leave `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorSnapshot {
    repositories: Vec<RepositoryDescriptor>,
}

impl DescriptorSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            repositories: Vec::new(),
        }
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &RepositoryName) -> Option<&RepositoryDescriptor> {
        self.repositories
            .iter()
            .find(|descriptor| descriptor.name() == name)
    }

    /// Returns `true` when a descriptor named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &RepositoryName) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RepositoryDescriptor> {
        self.repositories.iter()
    }

    /// Returns the descriptor names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<&RepositoryName> {
        self.repositories.iter().map(RepositoryDescriptor::name).collect()
    }

    /// Returns the number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Returns `true` when no descriptors are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Returns a snapshot containing `descriptor`, appending or replacing by
    /// name, together with the kind of change made.
    #[must_use]
    pub fn upsert(&self, descriptor: RepositoryDescriptor) -> (Self, DescriptorChange) {
        let mut found = false;
        let mut repositories = Vec::with_capacity(self.repositories.len() + 1);
        for existing in &self.repositories {
            if existing.name() == descriptor.name() {
                if *existing == descriptor {
                    return (self.clone(), DescriptorChange::Unchanged);
                }
                found = true;
                repositories.push(descriptor.clone());
            } else {
                repositories.push(existing.clone());
            }
        }

        if found {
            return (Self { repositories }, DescriptorChange::Updated);
        }
        repositories.push(descriptor);
        (Self { repositories }, DescriptorChange::Added)
    }

    /// Splits the snapshot into descriptors matching `pattern` and the
    /// remaining snapshot.
    #[must_use]
    pub fn remove_matching(&self, pattern: &NamePattern) -> (Self, Vec<RepositoryDescriptor>) {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .repositories
            .iter()
            .cloned()
            .partition(|descriptor| pattern.matches(descriptor.name()));
        (Self { repositories: kept }, removed)
    }
}

impl FromIterator<RepositoryDescriptor> for DescriptorSnapshot {
    fn from_iter<I: IntoIterator<Item = RepositoryDescriptor>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |snapshot, descriptor| snapshot.upsert(descriptor).0)
    }
}
